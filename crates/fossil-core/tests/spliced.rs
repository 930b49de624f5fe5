//! Tests for the spliced address space

use std::sync::Arc;

use fossil_core::error::{FossilError, Result};
use fossil_core::memory::{MemoryReader, SplicedMemory};
use fossil_core::types::Address;

/// Answers every address with its tag byte.
struct Tag(u8);

impl MemoryReader for Tag
{
    fn read_memory(&self, buf: &mut [u8], _addr: Address) -> Result<usize>
    {
        buf.fill(self.0);
        Ok(buf.len())
    }
}

fn tag(byte: u8) -> Arc<dyn MemoryReader>
{
    Arc::new(Tag(byte))
}

fn spans(mem: &SplicedMemory) -> Vec<(u64, u64)>
{
    mem.regions().map(|r| (r.offset().value(), r.length())).collect()
}

fn assert_well_formed(mem: &SplicedMemory)
{
    let mut previous_end = None;
    for region in mem.regions() {
        assert!(region.length() > 0, "empty region at {}", region.offset());
        if let Some(end) = previous_end {
            assert!(region.offset().value() >= end, "regions overlap at {}", region.offset());
        }
        previous_end = Some(region.end());
    }
}

#[test]
fn test_random_adds_match_model()
{
    const SPACE: usize = 256;
    let mut model: [Option<u8>; SPACE] = [None; SPACE];
    let mut mem = SplicedMemory::new();

    // Deterministic LCG so failures are reproducible.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) as usize
    };

    for round in 0..400u32 {
        let start = next() % SPACE;
        let len = next() % (SPACE - start + 1);
        let byte = (round % 251) as u8 + 1;
        mem.add(tag(byte), Address::from(start as u64), len as u64);
        for slot in &mut model[start..start + len] {
            *slot = Some(byte);
        }

        assert_well_formed(&mem);
        for (addr, expected) in model.iter().enumerate() {
            let mut buf = [0u8; 1];
            let got = mem.read_memory(&mut buf, Address::from(addr as u64));
            match expected {
                Some(byte) => {
                    assert_eq!(got.unwrap(), 1);
                    assert_eq!(buf[0], *byte, "round {round}, address {addr}");
                }
                None => assert!(matches!(got, Err(FossilError::NotMapped(_)))),
            }
        }
    }
}

#[test]
fn test_readding_same_interval_is_idempotent()
{
    let mut mem = SplicedMemory::new();
    let reader = tag(1);
    mem.add(Arc::clone(&reader), Address::from(0), 100);
    mem.add(Arc::clone(&reader), Address::from(0), 100);
    assert_eq!(spans(&mem), vec![(0, 100)]);
}

#[test]
fn test_inner_add_splits_region()
{
    let mut mem = SplicedMemory::new();
    mem.add(tag(1), Address::from(0), 100);
    mem.add(tag(2), Address::from(30), 10);
    assert_eq!(spans(&mem), vec![(0, 30), (30, 10), (40, 60)]);

    let mut buf = [0u8; 3];
    mem.read_memory(&mut buf, Address::from(29)).unwrap();
    assert_eq!(buf, [1, 2, 2]);
    mem.read_memory(&mut buf, Address::from(39)).unwrap();
    assert_eq!(buf, [2, 1, 1]);
}

#[test]
fn test_full_override_leaves_one_region()
{
    let mut mem = SplicedMemory::new();
    mem.add(tag(1), Address::from(10), 10);
    mem.add(tag(1), Address::from(50), 10);
    mem.add(tag(2), Address::from(0), 100);
    assert_eq!(spans(&mem), vec![(0, 100)]);
}

#[test]
fn test_hole_then_rehole()
{
    let mut mem = SplicedMemory::new();
    mem.add(tag(1), Address::from(0), 100);
    mem.add(tag(2), Address::from(30), 10);
    mem.add(tag(3), Address::from(30), 10);
    assert_eq!(spans(&mem), vec![(0, 30), (30, 10), (40, 60)]);

    let mut buf = [0u8; 1];
    mem.read_memory(&mut buf, Address::from(35)).unwrap();
    assert_eq!(buf[0], 3);
}

#[test]
fn test_gap_read_reports_partial_count()
{
    let mut mem = SplicedMemory::new();
    mem.add(tag(1), Address::from(0), 10);
    mem.add(tag(2), Address::from(20), 10);

    let mut buf = [0u8; 20];
    let err = mem.read_memory(&mut buf, Address::from(0)).unwrap_err();
    assert!(matches!(
        err,
        FossilError::Unmapped { address, read: 10 } if address == Address::from(10)
    ));
    assert_eq!(err.bytes_read(), 10);
    assert_eq!(&buf[..10], &[1; 10]);
}

#[test]
fn test_read_spanning_adjacent_regions()
{
    let mut mem = SplicedMemory::new();
    mem.add(tag(1), Address::from(0), 10);
    mem.add(tag(2), Address::from(10), 10);

    let mut buf = [0u8; 20];
    assert_eq!(mem.read_memory(&mut buf, Address::from(0)).unwrap(), 20);
    assert_eq!(&buf[..10], &[1; 10]);
    assert_eq!(&buf[10..], &[2; 10]);
}
