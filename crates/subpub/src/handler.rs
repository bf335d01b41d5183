//! Message sinks invoked by delivery tasks.

/// Receives messages delivered to a subscription.
///
/// A handler is owned by exactly one delivery task and is never invoked
/// concurrently with itself, so `handle` takes `&mut self` and may keep
/// private state without locking. It runs on Tokio's blocking pool and may
/// block; a slow handler only delays its own subscription.
///
/// Any `FnMut(M) + Send + 'static` closure is a handler.
pub trait MessageHandler<M>: Send + 'static {
    /// Process one delivered message.
    fn handle(&mut self, message: M);
}

impl<M, F> MessageHandler<M> for F
where
    F: FnMut(M) + Send + 'static,
{
    fn handle(&mut self, message: M) {
        self(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        seen: Vec<u32>,
    }

    impl MessageHandler<u32> for Counter {
        fn handle(&mut self, message: u32) {
            self.seen.push(message);
        }
    }

    fn deliver<H: MessageHandler<u32>>(handler: &mut H, messages: &[u32]) {
        for &m in messages {
            handler.handle(m);
        }
    }

    #[test]
    fn test_struct_handler_keeps_state() {
        let mut counter = Counter { seen: Vec::new() };
        deliver(&mut counter, &[3, 1, 2]);
        assert_eq!(counter.seen, vec![3, 1, 2]);
    }

    #[test]
    fn test_closure_is_handler() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut handler = move |m: u32| tx.send(m * 10).unwrap();
        deliver(&mut handler, &[1, 2, 3]);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![10, 20, 30]);
    }
}
