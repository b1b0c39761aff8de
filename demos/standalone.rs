use std::mem;

use markheap::{Heap, HeapError};

#[cfg(all(unix, not(miri)))]
fn heap() -> Result<Heap<markheap::Sbrk>, HeapError> {
    Ok(Heap::with_grower(markheap::Sbrk))
}

#[cfg(not(all(unix, not(miri))))]
fn heap() -> Result<Heap, HeapError> {
    Heap::new()
}

fn main() -> Result<(), HeapError> {
    env_logger::init();

    let mut heap = heap()?;

    let pointer = heap.allocate(mem::size_of::<*mut i32>())?.cast::<*mut i32>();
    let pointer2 = heap.allocate(mem::size_of::<i32>() * 10)?.cast::<i32>();

    unsafe {
        for i in 0..10 {
            *pointer2.as_ptr().add(i) = i as i32;
        }
        *pointer.as_ptr() = pointer2.as_ptr();
    }

    println!("Before collecting:\n{}", heap.dump());

    let freed = heap.collect();
    println!("Collected {freed} bytes\n");

    println!("{}", heap.dump());

    Ok(())
}
