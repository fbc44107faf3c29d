//! Pipeline wiring for the CLI.

use atlas_anim::AnimationScheduler;
use atlas_audio::{CpalCaptureDevice, NoopSink};
use atlas_channel::SpeechChannel;
use atlas_foundation::{real_clock, PipelineConfig};
use atlas_recognition::{RecognitionSession, TranscriptEvent};
use atlas_speech::{SpeechEvent, SpeechOrchestrator, SynthesisBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Owns one instance of every pipeline component, sharing a single channel
/// between synthesis and recognition.
pub struct Runtime {
    orchestrator: SpeechOrchestrator,
    scheduler: AnimationScheduler,
    recognition: RecognitionSession,
}

impl Runtime {
    pub fn new(config: PipelineConfig) -> Self {
        let channel = Arc::new(SpeechChannel::new(
            config.server_url.clone(),
            Duration::from_secs(config.speech.request_timeout_secs),
        ));
        let orchestrator = SpeechOrchestrator::new(
            Arc::clone(&channel) as Arc<dyn SynthesisBackend>,
            Arc::new(NoopSink::new()),
            &config,
            real_clock(),
        );
        let scheduler = AnimationScheduler::new(&config.anim);
        let recognition = RecognitionSession::new(
            channel,
            Arc::new(CpalCaptureDevice::new()),
            config.capture.clone(),
            config.language.clone(),
        );
        wire_visemes(&orchestrator, &scheduler);
        Self {
            orchestrator,
            scheduler,
            recognition,
        }
    }

    /// Speak one utterance and wait for its viseme timeline to drain.
    pub async fn speak(&self, text: &str) -> anyhow::Result<()> {
        self.orchestrator.speak(text).await?;
        self.wait_for_animation().await;
        Ok(())
    }

    /// Stream stdin through the chunk buffer, one line per burst.
    pub async fn speak_stdin(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.orchestrator.speak_chunk(&line);
            self.orchestrator.speak_chunk(" ");
        }
        // End of input: speak whatever is still buffered.
        self.orchestrator.flush();
        while self.orchestrator.is_speaking() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.wait_for_animation().await;
        Ok(())
    }

    /// Run a recognition session until Ctrl-C or server end-of-speech.
    pub async fn listen(&self) -> anyhow::Result<()> {
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<()>();
        self.recognition
            .events()
            .subscribe(move |event: &TranscriptEvent| match event {
                TranscriptEvent::Interim { text, .. } => println!("  ... {text}"),
                TranscriptEvent::Final { text, confidence } => {
                    println!(">> {text} (confidence {confidence:.2})");
                }
                TranscriptEvent::Ended => {
                    let _ = ended_tx.send(());
                }
                TranscriptEvent::Error { error } => eprintln!("recognition error: {error}"),
            });

        self.recognition.start().await?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; stopping recognition");
                self.recognition.stop().await;
            }
            _ = ended_rx.recv() => {}
        }
        Ok(())
    }

    async fn wait_for_animation(&self) {
        while self.scheduler.is_active() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Feed each spoken utterance's viseme timeline to the scheduler.
///
/// The lookup goes through the orchestrator's cache, so it never costs a
/// second server round trip.
fn wire_visemes(orchestrator: &SpeechOrchestrator, scheduler: &AnimationScheduler) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let canceller = scheduler.clone();
    orchestrator.events().subscribe(move |event: &SpeechEvent| match event {
        SpeechEvent::SpeakingStarted { text } => {
            let _ = tx.send(text.clone());
        }
        SpeechEvent::Stopped => canceller.cancel(),
        _ => {}
    });

    let orchestrator = orchestrator.clone();
    let scheduler = scheduler.clone();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            match orchestrator.synthesize(&text).await {
                Ok(result) => scheduler.enqueue_visemes(&result.visemes),
                Err(e) if e.is_cancellation() => {}
                Err(e) => tracing::warn!(error = %e, "viseme timeline lookup failed"),
            }
        }
    });
}
