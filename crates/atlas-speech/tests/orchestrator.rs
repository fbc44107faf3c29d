//! End-to-end orchestrator behavior against a scripted backend.

use async_trait::async_trait;
use atlas_audio::NoopSink;
use atlas_channel::SynthesisPayload;
use atlas_foundation::{real_clock, PipelineConfig, VoiceError, VoiceResult};
use atlas_speech::{SpeechEvent, SpeechOrchestrator, SynthesisBackend, SynthesisCache};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Backend that answers after a fixed virtual delay and honors cancellation.
struct MockBackend {
    calls: Mutex<Vec<String>>,
    delay: Duration,
    fail_on: Option<String>,
    cancels: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl MockBackend {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
            fail_on: None,
            cancels: Mutex::new(HashMap::new()),
        })
    }

    fn failing_on(delay: Duration, text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
            fail_on: Some(text.to_owned()),
            cancels: Mutex::new(HashMap::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    async fn open(&self) -> VoiceResult<()> {
        Ok(())
    }

    async fn synthesize(&self, id: &str, text: &str, _voice: &str) -> VoiceResult<SynthesisPayload> {
        self.calls.lock().push(text.to_owned());
        let (tx, rx) = oneshot::channel();
        self.cancels.lock().insert(id.to_owned(), tx);
        let outcome = tokio::select! {
            () = tokio::time::sleep(self.delay) => {
                if self.fail_on.as_deref() == Some(text) {
                    Err(VoiceError::SynthesisRejected("scripted failure".into()))
                } else {
                    // 4800 samples of 16-bit PCM at 24 kHz: 200 ms of audio.
                    Ok(SynthesisPayload {
                        audio: vec![0u8; 9_600],
                        format: "pcm16".into(),
                        sample_rate: 24_000,
                    })
                }
            }
            _ = rx => Err(VoiceError::Stopped),
        };
        self.cancels.lock().remove(id);
        outcome
    }

    fn cancel(&self, id: &str) {
        if let Some(tx) = self.cancels.lock().remove(id) {
            let _ = tx.send(());
        }
    }
}

fn orchestrator(backend: Arc<MockBackend>) -> SpeechOrchestrator {
    SpeechOrchestrator::new(
        backend,
        Arc::new(NoopSink::new()),
        &PipelineConfig::local(),
        real_clock(),
    )
}

/// Tag stream for asserting event order without matching on payloads.
fn record_events(orchestrator: &SpeechOrchestrator) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    orchestrator.events().subscribe(move |event: &SpeechEvent| {
        let tag = match event {
            SpeechEvent::SpeakingStarted { text } => format!("started:{text}"),
            SpeechEvent::SpeakingEnded => "ended".into(),
            SpeechEvent::Stopped => "stopped".into(),
            SpeechEvent::Error { error } => format!("error:{error}"),
        };
        sink.lock().push(tag);
    });
    log
}

async fn wait_idle(orchestrator: &SpeechOrchestrator) {
    while orchestrator.is_speaking() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn second_synthesize_is_served_from_cache() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));

    let first = orchestrator.synthesize("Hello").await.unwrap();
    let second = orchestrator.synthesize("Hello").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.calls(), vec!["Hello"]);
}

#[tokio::test(start_paused = true)]
async fn orchestrators_sharing_a_cache_share_results() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let config = PipelineConfig::local();
    let cache = Arc::new(SynthesisCache::new(&config.cache, real_clock()));
    let first = SpeechOrchestrator::with_cache(
        Arc::clone(&backend) as Arc<dyn SynthesisBackend>,
        Arc::new(NoopSink::new()),
        Arc::clone(&cache),
        &config,
    );
    let second = SpeechOrchestrator::with_cache(
        Arc::clone(&backend) as Arc<dyn SynthesisBackend>,
        Arc::new(NoopSink::new()),
        cache,
        &config,
    );

    first.synthesize("Hello").await.unwrap();
    second.synthesize("Hello").await.unwrap();

    assert_eq!(backend.calls(), vec!["Hello"]);
}

#[tokio::test(start_paused = true)]
async fn chunks_within_debounce_window_coalesce_into_one_segment() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));

    orchestrator.speak_chunk("Hel");
    orchestrator.speak_chunk("lo, world.");
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_idle(&orchestrator).await;

    assert_eq!(backend.calls(), vec!["Hello, world."]);
}

#[tokio::test(start_paused = true)]
async fn partial_tail_stays_buffered_until_a_boundary_arrives() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));

    orchestrator.speak_chunk("First one. And then a partial");
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_idle(&orchestrator).await;
    assert_eq!(backend.calls(), vec!["First one."]);

    orchestrator.speak_chunk(" tail.");
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_idle(&orchestrator).await;
    assert_eq!(
        backend.calls(),
        vec!["First one.", "And then a partial tail."]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_during_playback_clears_remaining_segments() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));
    let events = record_events(&orchestrator);

    orchestrator.speak_chunk("One. Two. Three.");
    // Debounce fires at 150 ms, first synthesis lands at 200 ms, first
    // playback runs 200 ms after that. Stop mid-playback of segment one.
    tokio::time::sleep(Duration::from_millis(250)).await;
    orchestrator.stop();
    wait_idle(&orchestrator).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(backend.calls(), vec!["One."]);
    assert!(events.lock().iter().any(|tag| tag == "stopped"));
}

#[tokio::test(start_paused = true)]
async fn stop_during_playback_interrupts_the_utterance() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));
    let events = record_events(&orchestrator);

    let speaker = orchestrator.clone();
    let speaking = tokio::spawn(async move { speaker.speak("A long utterance.").await });
    // Synthesis lands at 50 ms, playback runs 200 ms. Stop mid-play; the
    // halted utterance must not pass for one that played to completion.
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.stop();

    assert_eq!(speaking.await.unwrap().unwrap_err(), VoiceError::Stopped);
    let log = events.lock();
    assert!(log.iter().any(|tag| tag == "stopped"));
    assert!(!log.iter().any(|tag| tag == "ended"));
}

#[tokio::test(start_paused = true)]
async fn stop_while_idle_is_a_quiet_no_op() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(backend);
    let events = record_events(&orchestrator);

    orchestrator.stop();
    orchestrator.stop();

    assert!(events.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn speak_emits_started_then_ended() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(backend);
    let events = record_events(&orchestrator);

    orchestrator.speak("Hi there.").await.unwrap();

    assert_eq!(*events.lock(), vec!["started:Hi there.", "ended"]);
}

#[tokio::test(start_paused = true)]
async fn failed_segment_does_not_silence_the_rest_of_the_queue() {
    let backend = MockBackend::failing_on(Duration::from_millis(50), "Bad.");
    let orchestrator = orchestrator(Arc::clone(&backend));
    let events = record_events(&orchestrator);

    orchestrator.speak_chunk("Bad. Good.");
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_idle(&orchestrator).await;

    assert_eq!(backend.calls(), vec!["Bad.", "Good."]);
    let log = events.lock();
    assert!(log.iter().any(|tag| tag.starts_with("error:")));
    assert_eq!(log.iter().filter(|tag| *tag == "ended").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_speaks_the_partial_tail_without_waiting() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));

    orchestrator.speak_chunk("Done. And a trailing bit");
    orchestrator.flush();
    wait_idle(&orchestrator).await;

    assert_eq!(backend.calls(), vec!["Done.", "And a trailing bit"]);
}

#[tokio::test(start_paused = true)]
async fn empty_text_is_rejected() {
    let backend = MockBackend::new(Duration::from_millis(50));
    let orchestrator = orchestrator(Arc::clone(&backend));

    let synth = orchestrator.synthesize("   ").await;
    assert!(matches!(synth, Err(VoiceError::InvalidInput(_))));
    let speak = orchestrator.speak("").await;
    assert!(matches!(speak, Err(VoiceError::InvalidInput(_))));
    assert!(backend.calls().is_empty());
}
