
use crate::error::{trap, VmResult};
use crate::module::Limits;

pub const PAGE_SIZE: usize = 65536;
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    max: u32,
}

impl Memory {
    pub fn new(limits: Limits) -> Self {
        let max = limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES);
        let pages = limits.min.min(max);
        Memory {
            bytes: vec![0; pages as usize * PAGE_SIZE],
            max,
        }
    }

    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    /// Grows by `delta` pages, returning the previous size or `None` if the
    /// limit would be exceeded.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.pages();
        let new = old.checked_add(delta)?;
        if new > self.max {
            return None;
        }
        self.bytes.resize(new as usize * PAGE_SIZE, 0);
        Some(old)
    }

    fn range(&self, addr: u32, offset: u32, len: usize) -> VmResult<std::ops::Range<usize>> {
        let start = u64::from(addr) + u64::from(offset);
        let end = start + len as u64;
        if end > self.bytes.len() as u64 {
            return Err(trap!(
                MemoryOutOfBounds,
                "access of {len} byte(s) at {start:#x} exceeds memory size {:#x}",
                self.bytes.len()
            ));
        }
        Ok(start as usize..end as usize)
    }

    pub fn load<const N: usize>(&self, addr: u32, offset: u32) -> VmResult<[u8; N]> {
        let range = self.range(addr, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    pub fn store(&mut self, addr: u32, offset: u32, value: &[u8]) -> VmResult<()> {
        let range = self.range(addr, offset, value.len())?;
        self.bytes[range].copy_from_slice(value);
        Ok(())
    }

    pub fn fill(&mut self, addr: u32, value: u8, len: u32) -> VmResult<()> {
        let range = self.range(addr, 0, len as usize)?;
        self.bytes[range].fill(value);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> VmResult<()> {
        let from = self.range(src, 0, len as usize)?;
        let to = self.range(dst, 0, len as usize)?;
        self.bytes.copy_within(from, to.start);
        Ok(())
    }
}
