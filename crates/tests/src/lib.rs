//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 同步/异步分发器行为测试
//! - 配置 -> 分发器 e2e 测试

#[cfg(test)]
mod support {
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{HandlerError, Message, MessageHandler};

    /// Records (key, message) pairs in delivery order
    #[derive(Default)]
    pub struct Recorder {
        seen: Mutex<Vec<(String, Message)>>,
    }

    impl Recorder {
        pub fn seen(&self) -> Vec<(String, Message)> {
            self.seen.lock().unwrap().clone()
        }

        pub fn len(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn texts(&self) -> Vec<String> {
            self.seen()
                .iter()
                .filter_map(|(_, m)| m.as_text().map(str::to_string))
                .collect()
        }
    }

    impl MessageHandler for Recorder {
        fn on_message(&self, key: &str, message: &Message) -> Result<(), HandlerError> {
            self.seen
                .lock()
                .unwrap()
                .push((key.to_string(), message.clone()));
            Ok(())
        }
    }

    /// Poll `done` until it holds or `timeout` elapses
    pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    /// Deterministic key sequence (LCG) for order tests
    pub fn key_sequence(len: usize, keys: usize, seed: u64) -> Vec<String> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                format!("key-{}", (state >> 33) as usize % keys)
            })
            .collect()
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{BusConfig, Message, Payload, PayloadKind};
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let value = serde_json::to_value(Message::new(5i64)).unwrap();
        assert_eq!(value, json!({ "content": { "kind": "int", "value": 5 } }));

        let empty = serde_json::to_value(Message::empty()).unwrap();
        assert_eq!(empty, json!({ "content": null }));
    }

    #[test]
    fn test_message_round_trip_keeps_kind() {
        let original = Message::new(json!({ "id": 7 }));
        let text = serde_json::to_string(&original).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, original);
        assert_eq!(back.kind(), PayloadKind::Json);
        assert!(matches!(back.content(), Some(Payload::Json(_))));
    }

    #[test]
    fn test_default_config_shape() {
        let value = serde_json::to_value(BusConfig::default()).unwrap();
        assert_eq!(value["dispatcher"]["poll_interval_ms"], 50);
        assert_eq!(value["dispatcher"]["failure_policy"], "log_and_continue");
        assert_eq!(value["logging"]["format"], "pretty");
    }
}

#[cfg(test)]
mod sync_tests {
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use contracts::{HandlerError, Message, MessageHandler};
    use dispatcher::MessageDispatcher;

    use crate::support::{key_sequence, Recorder};

    #[test]
    fn test_messages_delivered_in_push_order() {
        let dispatcher = MessageDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        for i in 0..5 {
            dispatcher.register_handler(format!("key-{i}"), &recorder);
        }

        let keys = key_sequence(500, 5, 42);
        for (i, key) in keys.iter().enumerate() {
            dispatcher.push_message(key.as_str(), i as i64);
        }
        assert_eq!(dispatcher.dispatch().unwrap(), 500);

        let seen = recorder.seen();
        let delivered_keys: Vec<&str> = seen.iter().map(|(k, _)| k.as_str()).collect();
        let pushed_keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        assert_eq!(delivered_keys, pushed_keys);
        let values: Vec<i64> = seen.iter().filter_map(|(_, m)| m.as_int()).collect();
        assert_eq!(values, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_delivery_until_unregister() {
        let dispatcher = MessageDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        dispatcher.register_handler("topic", &recorder);

        for i in 0..3 {
            dispatcher.push_message("topic", format!("before {i}"));
        }
        dispatcher.dispatch().unwrap();

        dispatcher.unregister_handler("topic", &recorder);
        for i in 0..3 {
            dispatcher.push_message("topic", format!("after {i}"));
        }
        dispatcher.dispatch().unwrap();

        assert_eq!(recorder.texts(), ["before 0", "before 1", "before 2"]);
        assert_eq!(dispatcher.metrics().dropped_count, 3);
    }

    #[test]
    fn test_unregister_absent_handler_is_noop() {
        let dispatcher = MessageDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        dispatcher.unregister_handler("never", &recorder);
        assert_eq!(dispatcher.handler_count("never"), 0);
    }

    /// Registers `late` under "late" and pushes to it on first message
    struct Installer {
        dispatcher: Rc<MessageDispatcher>,
        late: Arc<Recorder>,
        installed: Mutex<bool>,
    }

    impl MessageHandler for Installer {
        fn on_message(&self, _key: &str, _message: &Message) -> Result<(), HandlerError> {
            let mut installed = self.installed.lock().unwrap();
            if !*installed {
                self.dispatcher.register_handler("late", &self.late);
                self.dispatcher.push_message("late", "hello");
                *installed = true;
            }
            Ok(())
        }
    }

    #[test]
    fn test_register_and_push_from_handler() {
        let dispatcher = Rc::new(MessageDispatcher::new());
        let late = Arc::new(Recorder::default());
        let installer = Arc::new(Installer {
            dispatcher: Rc::clone(&dispatcher),
            late: Arc::clone(&late),
            installed: Mutex::new(false),
        });
        dispatcher.register_handler("setup", &installer);

        dispatcher.push("setup");
        assert_eq!(dispatcher.dispatch().unwrap(), 2);
        assert_eq!(late.texts(), ["hello"]);
        assert_eq!(dispatcher.handler_count("late"), 1);
    }
}

#[cfg(test)]
mod async_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{DispatcherConfig, HandlerError, Message, MessageHandler};
    use dispatcher::AsyncMessageDispatcher;

    use crate::support::{wait_until, Recorder};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            poll_interval_ms: 5,
            ..DispatcherConfig::default()
        }
    }

    #[test]
    fn test_hundred_messages_in_order() {
        let dispatcher = AsyncMessageDispatcher::with_config(fast_config());
        let recorder = Arc::new(Recorder::default());
        dispatcher.register_handler("string", &recorder);
        dispatcher.start_dispatching().unwrap();

        for i in 0..100 {
            dispatcher.push_message("string", format!("message {i}"));
        }

        assert!(wait_until(TIMEOUT, || recorder.len() == 100));
        dispatcher.stop_dispatching().unwrap();

        let expected: Vec<String> = (0..100).map(|i| format!("message {i}")).collect();
        assert_eq!(recorder.texts(), expected);
    }

    #[test]
    fn test_messages_pushed_while_stopped_are_delivered_on_start() {
        let dispatcher = AsyncMessageDispatcher::with_config(fast_config());
        let recorder = Arc::new(Recorder::default());
        dispatcher.register_handler("k", &recorder);

        dispatcher.push("k");
        dispatcher.push_message("k", true);
        assert_eq!(dispatcher.pending(), 2);

        dispatcher.start_dispatching().unwrap();
        assert!(wait_until(TIMEOUT, || recorder.len() == 2));
        dispatcher.stop_dispatching().unwrap();

        let seen = recorder.seen();
        assert!(!seen[0].1.is_valid());
        assert_eq!(seen[1].1.as_bool(), Some(true));
    }

    /// Counts deliveries; fails if called after `retired` is set
    #[derive(Default)]
    struct Guarded {
        calls: AtomicUsize,
        retired: AtomicBool,
    }

    impl MessageHandler for Guarded {
        fn on_message(&self, key: &str, _message: &Message) -> Result<(), HandlerError> {
            if self.retired.load(Ordering::SeqCst) {
                return Err(HandlerError::rejected(key, "delivered after unregister"));
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_register_unregister_push() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 50;
        const PER_ROUND: usize = 10;

        let dispatcher = Arc::new(AsyncMessageDispatcher::with_config(fast_config()));
        let shared = Arc::new(Guarded::default());
        dispatcher.register_handler("shared", &shared);
        dispatcher.start_dispatching().unwrap();

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    let key = format!("own-{t}");
                    for _ in 0..ROUNDS {
                        let own = Arc::new(Guarded::default());
                        dispatcher.register_handler(key.as_str(), &own);
                        for _ in 0..PER_ROUND {
                            dispatcher.push(key.as_str());
                            dispatcher.push("shared");
                        }
                        dispatcher.unregister_handler(&key, &own);
                        own.retired.store(true, Ordering::SeqCst);
                        dispatcher.push(key.as_str());
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let expected = THREADS * ROUNDS * PER_ROUND;
        assert!(wait_until(TIMEOUT, || shared.calls.load(Ordering::SeqCst) == expected));
        dispatcher.stop_dispatching().unwrap();

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.pushed_count as usize, THREADS * ROUNDS * (2 * PER_ROUND + 1));
        for t in 0..THREADS {
            assert_eq!(dispatcher.handler_count(&format!("own-{t}")), 0);
        }
    }

    /// Pushes a follow-up from the worker thread
    struct Relay {
        dispatcher: std::sync::Weak<AsyncMessageDispatcher>,
    }

    impl MessageHandler for Relay {
        fn on_message(&self, _key: &str, message: &Message) -> Result<(), HandlerError> {
            if let Some(dispatcher) = self.dispatcher.upgrade() {
                dispatcher.push_message("relayed", message.clone());
            }
            Ok(())
        }
    }

    #[test]
    fn test_push_from_worker_thread() {
        let dispatcher = Arc::new(AsyncMessageDispatcher::with_config(fast_config()));
        let relay = Arc::new(Relay {
            dispatcher: Arc::downgrade(&dispatcher),
        });
        let sink = Arc::new(Recorder::default());
        dispatcher.register_handler("in", &relay);
        dispatcher.register_handler("relayed", &sink);
        dispatcher.start_dispatching().unwrap();

        for i in 0..10 {
            dispatcher.push_message("in", format!("m{i}"));
        }

        assert!(wait_until(TIMEOUT, || sink.len() == 10));
        dispatcher.stop_dispatching().unwrap();
        assert_eq!(sink.texts()[9], "m9");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{HandlerError, Message, MessageHandler};
    use dispatcher::AsyncMessageDispatcher;

    const CONFIG: &str = r#"
[dispatcher]
poll_interval_ms = 10
worker_name = "e2e-worker"
drain_on_stop = true

[logging]
level = "debug"
"#;

    /// Counts deliveries seen on the configured worker thread
    #[derive(Default)]
    struct ThreadCheck {
        on_worker: AtomicUsize,
        elsewhere: AtomicUsize,
    }

    impl MessageHandler for ThreadCheck {
        fn on_message(&self, _key: &str, _message: &Message) -> Result<(), HandlerError> {
            if thread::current().name() == Some("e2e-worker") {
                self.on_worker.fetch_add(1, Ordering::SeqCst);
            } else {
                self.elsewhere.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    /// Config file -> dispatcher -> handlers, with drain on stop
    #[test]
    fn test_config_to_dispatcher_drain() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let dispatcher = AsyncMessageDispatcher::with_config(config.dispatcher);
        assert_eq!(dispatcher.config().worker_name, "e2e-worker");

        let handler = Arc::new(ThreadCheck::default());
        dispatcher.register_handler("events", &handler);
        dispatcher.start_dispatching().unwrap();

        for i in 0..1000i64 {
            dispatcher.push_message("events", i);
        }
        dispatcher.stop_dispatching().unwrap();

        assert_eq!(handler.on_worker.load(Ordering::SeqCst), 1000);
        assert_eq!(handler.elsewhere.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.pending(), 0);
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn test_restart_after_stop_keeps_queue() {
        let mut config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        config.dispatcher.drain_on_stop = false;
        let dispatcher = AsyncMessageDispatcher::with_config(config.dispatcher);
        let handler = Arc::new(ThreadCheck::default());
        dispatcher.register_handler("events", &handler);

        dispatcher.start_dispatching().unwrap();
        dispatcher.stop_dispatching().unwrap();
        dispatcher.push("events");
        assert_eq!(dispatcher.pending(), 1);

        dispatcher.start_dispatching().unwrap();
        assert!(crate::support::wait_until(
            std::time::Duration::from_secs(10),
            || handler.on_worker.load(Ordering::SeqCst) == 1
        ));
        dispatcher.stop_dispatching().unwrap();
    }
}
