//! Linear-sweep disassembly strategy

use std::fmt;
use std::iter::FusedIterator;
use std::time::Instant;

use rayon::prelude::*;

use crate::{DecodeError, Decoder, Disassembly, Insn, Offset};

/// Why a linear sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// The cursor reached the end of the stream
    Exhausted,
    /// No record could be decoded at the cursor; nothing after it is decoded
    Failed(DecodeError),
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stop::Exhausted => write!(f, "end of stream"),
            Stop::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Lazy linear sweep over one byte stream.
///
/// Yields one record per instruction starting at offset 0. Once it returns
/// `None` it stays exhausted; [`LinearSweep::stop`] then tells why and
/// [`LinearSweep::cursor`] how many bytes were decoded.
#[derive(Debug)]
pub struct LinearSweep<'a, D: Decoder + ?Sized> {
    image: &'a [u8],
    decoder: &'a D,
    cursor: Offset,
    stop: Option<Stop>,
}

impl<'a, D: Decoder + ?Sized> LinearSweep<'a, D> {
    pub fn new(image: &'a [u8], decoder: &'a D) -> Self {
        Self {
            image,
            decoder,
            cursor: 0,
            stop: None,
        }
    }

    /// Offset of the next instruction to decode.
    pub fn cursor(&self) -> Offset {
        self.cursor
    }

    /// The stop reason, once the sweep has ended.
    pub fn stop(&self) -> Option<&Stop> {
        self.stop.as_ref()
    }

    /// Drain the remaining records into a [`Disassembly`].
    pub fn finish(mut self) -> Disassembly {
        let insns: Vec<Insn> = self.by_ref().collect();
        Disassembly {
            insns,
            cursor: self.cursor,
            stop: self.stop.unwrap_or(Stop::Exhausted),
        }
    }
}

impl<D: Decoder + ?Sized> Iterator for LinearSweep<'_, D> {
    type Item = Insn;

    fn next(&mut self) -> Option<Insn> {
        if self.stop.is_some() {
            return None;
        }
        if self.cursor >= self.image.len() {
            self.stop = Some(Stop::Exhausted);
            return None;
        }

        match self.decoder.decode(self.image, self.cursor) {
            Ok(insn) => {
                log::trace!("{:04x}: {}", insn.offset, insn);
                // Avoid looping forever on a zero-sized record
                debug_assert!(insn.size > 0, "decoder returned an empty record");
                self.cursor += (insn.size as Offset).max(1);
                Some(insn)
            }
            Err(err) => {
                log::warn!("linear sweep stopped at 0x{:04x}: {}", self.cursor, err);
                self.stop = Some(Stop::Failed(err));
                None
            }
        }
    }
}

impl<D: Decoder + ?Sized> FusedIterator for LinearSweep<'_, D> {}

/// Linear-sweep disassembly of one buffer
///
/// # Arguments
/// * `image` - The bytes to disassemble
/// * `decoder` - The decoder to use for disassembly
///
/// # Returns
/// Every record decoded before the sweep stopped, and the stop reason
pub fn run(image: &[u8], decoder: &dyn Decoder) -> Disassembly {
    log::debug!("starting linear sweep on {} bytes", image.len());
    let start_time = Instant::now();

    let disassembly = LinearSweep::new(image, decoder).finish();

    log::debug!(
        "linear sweep finished in {:?}: {} instructions, {} of {} bytes, {}",
        start_time.elapsed(),
        disassembly.instruction_count(),
        disassembly.cursor,
        image.len(),
        disassembly.stop
    );
    disassembly
}

/// Disassemble independent buffers in parallel.
///
/// Each buffer gets its own sweep and cursor; results come back in input order.
pub fn run_many<S>(images: &[S], decoder: &dyn Decoder) -> Vec<Disassembly>
where
    S: AsRef<[u8]> + Sync,
{
    images
        .par_iter()
        .map(|image| run(image.as_ref(), decoder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Missing, Mnemonic, X86Decoder};

    #[test]
    fn test_sweep_walks_every_instruction() {
        let code = [0x55, 0x89, 0xE5, 0x90, 0xC3];
        let result = run(&code, &X86Decoder);
        let offsets: Vec<Offset> = result.insns.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 4]);
        assert_eq!(result.cursor, 5);
        assert!(result.is_complete());
    }

    #[test]
    fn test_sweep_is_lazy_and_fused() {
        let code = [0x90, 0x81];
        let mut sweep = LinearSweep::new(&code, &X86Decoder);
        assert_eq!(sweep.stop(), None);

        let nop = sweep.next().unwrap();
        assert_eq!(nop.mnemonic, Mnemonic::Nop);
        assert_eq!(sweep.cursor(), 1);
        assert_eq!(sweep.stop(), None);

        assert!(sweep.next().is_none());
        assert!(sweep.next().is_none());
        assert!(matches!(sweep.stop(), Some(Stop::Failed(_))));
        assert_eq!(sweep.cursor(), 1);
    }

    #[test]
    fn test_truncation_keeps_earlier_records() {
        // NOP, then MOV EAX, imm32 with one byte missing
        let code = [0x90, 0xB8, 0x01, 0x02, 0x03];
        let result = run(&code, &X86Decoder);
        assert_eq!(result.instruction_count(), 1);
        assert_eq!(result.cursor, 1);
        let t = result.truncation().unwrap();
        assert_eq!(t.offset, 1);
        assert_eq!(t.missing, Missing::Immediate32);
    }

    #[test]
    fn test_empty_stream() {
        let result = run(&[], &X86Decoder);
        assert!(result.insns.is_empty());
        assert_eq!(result.cursor, 0);
        assert_eq!(result.stop, Stop::Exhausted);
    }

    #[test]
    fn test_run_many_keeps_input_order() {
        let images: Vec<Vec<u8>> = vec![vec![0x90; 3], vec![0xC3], vec![0xB8, 0x01], vec![]];
        let results = run_many(&images, &X86Decoder);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].instruction_count(), 3);
        assert_eq!(results[1].insns[0].mnemonic, Mnemonic::Ret);
        assert!(results[2].truncation().is_some());
        assert!(results[3].is_complete());
    }
}
