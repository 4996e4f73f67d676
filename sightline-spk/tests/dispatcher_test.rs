//! Ordering and resilience of the speech queue

use parking_lot::Mutex;
use sightline_spk::{CustomTtsEngine, SpeechDispatcher, SpeechError, TtsEngine};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(String),
    End(String),
}

fn slow_recorder(log: Arc<Mutex<Vec<Event>>>) -> Box<dyn TtsEngine> {
    Box::new(CustomTtsEngine::new("slow", move |text| {
        log.lock().push(Event::Start(text.to_string()));
        thread::sleep(Duration::from_millis(5));
        log.lock().push(Event::End(text.to_string()));
        Ok(())
    }))
}

#[test]
fn test_utterances_never_overlap_and_keep_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = SpeechDispatcher::spawn(slow_recorder(log.clone())).unwrap();

    dispatcher.enqueue("A").unwrap();
    dispatcher.enqueue("B").unwrap();
    dispatcher.enqueue("C").unwrap();
    dispatcher.shutdown();

    let expected: Vec<Event> = ["A", "B", "C"]
        .iter()
        .flat_map(|t| vec![Event::Start(t.to_string()), Event::End(t.to_string())])
        .collect();
    assert_eq!(*log.lock(), expected);
}

#[test]
fn test_concurrent_producers_are_serialized() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Arc::new(SpeechDispatcher::spawn(slow_recorder(log.clone())).unwrap());

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    dispatcher.enqueue(format!("{}-{}", p, i)).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    dispatcher.shutdown();

    let log = log.lock();
    assert_eq!(log.len(), 40);
    // Every start is immediately followed by its own end
    for pair in log.chunks(2) {
        match (&pair[0], &pair[1]) {
            (Event::Start(a), Event::End(b)) => assert_eq!(a, b),
            other => panic!("Overlapping utterances: {:?}", other),
        }
    }
    // Per-producer order is preserved
    for p in 0..4 {
        let prefix = format!("{}-", p);
        let order: Vec<&String> = log
            .iter()
            .filter_map(|e| match e {
                Event::Start(t) if t.starts_with(&prefix) => Some(t),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..5).map(|i| format!("{}-{}", p, i)).collect();
        assert_eq!(order, expected.iter().collect::<Vec<_>>());
    }
}

#[test]
fn test_render_failure_does_not_stop_worker() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let sink = spoken.clone();
    let engine = CustomTtsEngine::new("flaky", move |text| {
        if text == "bad" {
            return Err(SpeechError::Engine("device busy".to_string()));
        }
        sink.lock().push(text.to_string());
        Ok(())
    });
    let dispatcher = SpeechDispatcher::spawn(Box::new(engine)).unwrap();

    dispatcher.enqueue("first").unwrap();
    dispatcher.enqueue("bad").unwrap();
    dispatcher.enqueue("second").unwrap();
    dispatcher.shutdown();

    assert_eq!(*spoken.lock(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn test_dropping_dispatcher_joins_worker() {
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let dispatcher = SpeechDispatcher::spawn(slow_recorder(log.clone())).unwrap();
        dispatcher.enqueue("bye").unwrap();
    }
    assert_eq!(log.lock().len(), 2);
}
