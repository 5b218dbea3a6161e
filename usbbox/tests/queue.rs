mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use usbbox::{Message, queue::MessageQueue};

fn numbered(i: u32) -> Message {
    let [a, b, c, d] = i.to_be_bytes();
    Message::new([a, b, c, d, 0, 0, 0, 0])
}

fn index(msg: Message) -> u32 {
    let bytes = msg.as_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[test]
fn queue_survives_concurrent_push_and_pop() {
    const COUNT: u32 = 1000;

    common::init_tracing();

    for _ in 0..20 {
        let queue = Arc::new(MessageQueue::new(8, None));
        let done = Arc::new(AtomicBool::new(false));

        let producer = thread::spawn({
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);

            move || {
                for i in 0..COUNT {
                    assert!(queue.push(numbered(i)));
                }
                done.store(true, Ordering::Release);
            }
        });

        let mut received = Vec::with_capacity(COUNT as usize);
        loop {
            match queue.pop() {
                Some(msg) => received.push(index(msg)),
                None if done.load(Ordering::Acquire) && queue.is_empty() => break,
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert_eq!(received, (0..COUNT).collect::<Vec<_>>());
        assert_eq!(queue.dropped(), 0);
    }
}

#[test]
fn queue_keeps_everything_pushed_within_capacity() {
    let queue = MessageQueue::new(100, None);
    let capacity = queue.capacity() as u32;

    for i in 0..capacity {
        queue.push(numbered(i));
    }
    assert_eq!(queue.capacity(), capacity as usize);

    let popped: Vec<u32> = std::iter::from_fn(|| queue.pop()).map(index).collect();
    assert_eq!(popped, (0..capacity).collect::<Vec<_>>());
}
