//! Tests for searching dump memory

mod common;

use std::sync::Arc;

use common::{GoProcess, DATA_BASE};
use fossil_core::memory::{OffsetReaderAt, SplicedMemory};
use fossil_core::search::find_first;
use fossil_core::types::Address;

fn region(memory: &mut SplicedMemory, base: u64, bytes: Vec<u8>)
{
    let len = bytes.len() as u64;
    memory.add(Arc::new(OffsetReaderAt::new(bytes, Address::from(base))), Address::from(base), len);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finds_pattern_in_later_region()
{
    let mut memory = SplicedMemory::new();
    region(&mut memory, 0x1000, vec![0xaa; 0x400]);
    region(&mut memory, 0x8000, vec![0xbb; 0x400]);
    let mut third = vec![0u8; 0x800];
    third[0x555..0x55b].copy_from_slice(b"secret");
    region(&mut memory, 0x10_0000, third);

    let found = find_first(&memory, b"secret", 0x100).await.unwrap();
    assert_eq!(found, Some(Address::from(0x10_0555)));
}

#[tokio::test]
async fn test_reports_one_of_several_matches()
{
    let mut memory = SplicedMemory::new();
    region(&mut memory, 0x1000, b"xxneedlexx".to_vec());
    region(&mut memory, 0x2000, b"needle".to_vec());

    let found = find_first(&memory, b"needle", 64).await.unwrap();
    assert!(matches!(found, Some(a) if a == Address::from(0x1002) || a == Address::from(0x2000)));
}

#[tokio::test]
async fn test_missing_pattern()
{
    let mut memory = SplicedMemory::new();
    region(&mut memory, 0x1000, vec![0; 0x1000]);
    assert_eq!(find_first(&memory, b"\x01\x02", 128).await.unwrap(), None);
    assert_eq!(find_first(&SplicedMemory::new(), b"x", 128).await.unwrap(), None);
}

#[tokio::test]
async fn test_match_straddling_regions_is_not_found()
{
    let mut memory = SplicedMemory::new();
    region(&mut memory, 0x1000, b"...nee".to_vec());
    region(&mut memory, 0x1006, b"dle...".to_vec());
    assert_eq!(find_first(&memory, b"needle", 4).await.unwrap(), None);
}

#[tokio::test]
async fn test_search_core_memory()
{
    let core = GoProcess::sample().core();
    let found = find_first(core.memory(), b"go1.21.5", 0x40).await.unwrap();
    assert_eq!(found, Some(Address::from(DATA_BASE + 0x100)));
}
