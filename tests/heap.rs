use std::{mem, ptr::NonNull};

use markheap::{Heap, HeapError, BLOCK_HEADER_SIZE, MIN_BLOCK_SIZE, POINTER_SIZE};
use test_env_log::test;

/// Writes the address of `target` in the first word of `slot`.
unsafe fn link(slot: NonNull<u8>, target: NonNull<u8>) {
    *slot.cast::<usize>().as_ptr() = target.as_ptr() as usize;
}

fn occupied(heap: &Heap) -> Vec<NonNull<u8>> {
    heap.occupied_blocks().map(|block| block.content).collect()
}

fn free(heap: &Heap) -> Vec<NonNull<u8>> {
    heap.free_blocks().map(|block| block.content).collect()
}

#[test]
fn pointer_stored_in_another_block_survives() {
    let mut heap = Heap::new().unwrap();

    let p1 = heap.allocate(mem::size_of::<usize>()).unwrap();
    let p2 = heap.allocate(10 * mem::size_of::<i32>()).unwrap();

    unsafe {
        p2.cast::<[i32; 10]>().as_ptr().write([0; 10]);
        link(p1, p2);
    }

    assert_eq!(heap.collect(), mem::size_of::<usize>());
    assert_eq!(occupied(&heap), vec![p2]);
    assert_eq!(free(&heap), vec![p1]);
}

#[test]
fn collection_is_idempotent() {
    let mut heap = Heap::new().unwrap();

    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    unsafe {
        a.as_ptr().write_bytes(0, 32);
        b.as_ptr().write_bytes(0, 32);
        link(a, b);
    }

    assert_eq!(heap.collect(), 32);
    assert_eq!(heap.collect(), 32);
    assert_eq!(heap.collect(), 0);
    assert_eq!(heap.collect(), 0);
}

#[test]
fn chain_of_three_survives() {
    let mut heap = Heap::new().unwrap();

    let a = heap.allocate(POINTER_SIZE).unwrap();
    let b = heap.allocate(POINTER_SIZE).unwrap();
    let c = heap.allocate(POINTER_SIZE).unwrap();

    unsafe {
        link(a, b);
        link(b, c);
        link(c, a);
    }

    assert_eq!(heap.collect(), 0);
    assert_eq!(occupied(&heap), vec![a, b, c]);
}

#[test]
fn deallocated_address_is_handed_out_again() {
    let mut heap = Heap::new().unwrap();

    let block = heap.allocate(100).unwrap();
    let capacity = unsafe { heap.block_info(block) }.max_size;
    assert_eq!(capacity, 100 + MIN_BLOCK_SIZE);

    unsafe { heap.deallocate(block) };

    let again = heap.allocate(capacity).unwrap();
    assert_eq!(again, block);
    assert_eq!(unsafe { heap.block_info(again) }.used_size, capacity);
}

#[test]
fn sizing_rules() {
    let mut heap = Heap::new().unwrap();

    let cases = [
        (0, MIN_BLOCK_SIZE),
        (1, MIN_BLOCK_SIZE),
        (MIN_BLOCK_SIZE, MIN_BLOCK_SIZE),
        (3 * MIN_BLOCK_SIZE, 3 * MIN_BLOCK_SIZE),
        // One increment added, not rounded to the next multiple.
        (MIN_BLOCK_SIZE + 1, 2 * MIN_BLOCK_SIZE + 1),
        (2 * MIN_BLOCK_SIZE + 7, 3 * MIN_BLOCK_SIZE + 7),
    ];

    for (size, expected) in cases {
        let address = heap.allocate(size).unwrap();
        let info = unsafe { heap.block_info(address) };
        assert_eq!(info.max_size, expected, "allocate({size})");
        assert_eq!(info.used_size, size);
        assert_eq!(address.as_ptr() as usize % POINTER_SIZE, 0);
        assert_eq!(
            info.content.as_ptr() as usize - info.header.as_ptr() as usize,
            BLOCK_HEADER_SIZE
        );
    }
}

#[test]
fn small_heap_runs_out_and_recovers() {
    let mut heap = Heap::with_capacity(1).unwrap();
    let block = 64;

    let mut addresses = Vec::new();
    let error = loop {
        match heap.allocate(block) {
            Ok(address) => addresses.push(address),
            Err(error) => break error,
        }
    };

    assert_eq!(
        error,
        HeapError::Exhausted {
            requested: BLOCK_HEADER_SIZE + block
        }
    );
    assert_eq!(
        addresses.len(),
        heap.grower().capacity() / (BLOCK_HEADER_SIZE + block)
    );

    // Nothing references anything, so a collection frees every block and
    // allocations work again without growing.
    for address in &addresses {
        unsafe { address.as_ptr().write_bytes(0, block) };
    }
    assert_eq!(heap.collect(), addresses.len() * block);
    assert_eq!(heap.allocate(block).unwrap(), addresses[0]);
}

#[test]
fn dump_reflects_collection() {
    let mut heap = Heap::new().unwrap();

    let a = heap.allocate(8).unwrap();
    unsafe { a.as_ptr().write_bytes(0, 8) };

    let before = heap.dump().to_string();
    assert!(before.starts_with("FREE LIST:\nOCCUPIED LIST:\n\tBlock #0"));

    heap.collect();

    let after = heap.dump().to_string();
    assert!(after.starts_with("FREE LIST:\n\tBlock #0"));
    assert!(after.ends_with("OCCUPIED LIST:\n"));
    assert!(after.contains("==> max size: 8, used size: 0"));
}
