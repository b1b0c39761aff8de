use std::thread;

use markheap::{HeapError, SharedHeap};

fn main() -> Result<(), HeapError> {
    env_logger::init();

    let heap = SharedHeap::with_capacity(64 * 1024)?;

    // Each thread builds a small linked chain: every block stores the address
    // of the one allocated before it. Only the head of each chain ends up
    // unreferenced.
    thread::scope(|scope| {
        for n in 1..=4 {
            let heap = &heap;
            scope.spawn(move || -> Result<(), HeapError> {
                let mut previous = 0usize;
                for _ in 0..n {
                    let block = heap.allocate(16)?;
                    unsafe {
                        let words = block.cast::<usize>().as_ptr();
                        *words = previous;
                        *words.add(1) = n;
                    }
                    previous = block.as_ptr() as usize;
                }
                println!("thread {n}: chain head at {previous:#x}");
                Ok(())
            });
        }
    });

    println!("Before collecting: {:?}", heap.stats()?);

    let stats = heap.collect_with_stats()?;
    println!("Collected {stats:?}");
    println!("After collecting: {:?}\n", heap.stats()?);

    heap.with_heap(|heap| println!("{}", heap.dump()))?;

    Ok(())
}
