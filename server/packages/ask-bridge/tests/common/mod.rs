#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use ask_bridge::bridge::{ChunkIter, ChunkSource, Frame, StreamSession};
use ask_bridge_error::BridgeError;

/// One scripted producer step.
#[derive(Debug, Clone)]
pub enum Step {
    Text(&'static str),
    Fail(&'static str),
    Pause(Duration),
}

/// Counters shared between a fake source and the test body.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub produced: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().expect("inputs lock").clone()
    }

    pub async fn wait_released(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.released() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.released()
    }

    pub async fn wait_produced(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.produced() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Flags the probe when the producer lets go of its iterator.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedSource {
    steps: Vec<Step>,
    open_error: Option<&'static str>,
    pub probe: Probe,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            open_error: None,
            probe: Probe::default(),
        })
    }

    pub fn texts(texts: &[&'static str]) -> Arc<Self> {
        Self::new(texts.iter().copied().map(Step::Text).collect())
    }

    pub fn failing_to_open(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            steps: Vec::new(),
            open_error: Some(message),
            probe: Probe::default(),
        })
    }
}

struct ScriptIter {
    steps: VecDeque<Step>,
    produced: Arc<AtomicUsize>,
    _guard: ReleaseGuard,
}

impl Iterator for ScriptIter {
    type Item = Result<String, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.steps.pop_front()? {
                Step::Pause(duration) => std::thread::sleep(duration),
                Step::Text(text) => {
                    self.produced.fetch_add(1, Ordering::SeqCst);
                    return Some(Ok(text.to_string()));
                }
                Step::Fail(message) => return Some(Err(BridgeError::stream_abort(message))),
            }
        }
    }
}

impl ChunkSource for ScriptedSource {
    fn stream(&self, input: &str) -> Result<ChunkIter, BridgeError> {
        self.probe
            .inputs
            .lock()
            .expect("inputs lock")
            .push(input.to_string());
        if let Some(message) = self.open_error {
            return Err(BridgeError::upstream(message));
        }
        Ok(Box::new(ScriptIter {
            steps: self.steps.iter().cloned().collect(),
            produced: self.probe.produced.clone(),
            _guard: ReleaseGuard(self.probe.released.clone()),
        }))
    }
}

/// Produces `tick N` forever.
#[derive(Default)]
pub struct EndlessSource {
    pub probe: Probe,
}

struct EndlessIter {
    produced: Arc<AtomicUsize>,
    _guard: ReleaseGuard,
}

impl Iterator for EndlessIter {
    type Item = Result<String, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.produced.fetch_add(1, Ordering::SeqCst);
        Some(Ok(format!("tick {index}")))
    }
}

impl ChunkSource for EndlessSource {
    fn stream(&self, _input: &str) -> Result<ChunkIter, BridgeError> {
        Ok(Box::new(EndlessIter {
            produced: self.probe.produced.clone(),
            _guard: ReleaseGuard(self.probe.released.clone()),
        }))
    }
}

/// Blocks before its only chunk until the test opens the gate (or drops it).
pub struct GatedSource {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    pub probe: Probe,
}

impl GatedSource {
    pub fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let source = Arc::new(Self {
            gate: Mutex::new(Some(rx)),
            probe: Probe::default(),
        });
        (source, tx)
    }
}

struct GatedIter {
    gate: Option<mpsc::Receiver<()>>,
    _guard: ReleaseGuard,
}

impl Iterator for GatedIter {
    type Item = Result<String, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let gate = self.gate.take()?;
        gate.recv().ok()?;
        Some(Ok("late answer".to_string()))
    }
}

impl ChunkSource for GatedSource {
    fn stream(&self, _input: &str) -> Result<ChunkIter, BridgeError> {
        let gate = self
            .gate
            .lock()
            .expect("gate lock")
            .take()
            .ok_or_else(|| BridgeError::upstream("gated source already used"))?;
        Ok(Box::new(GatedIter {
            gate: Some(gate),
            _guard: ReleaseGuard(self.probe.released.clone()),
        }))
    }
}

pub struct PanickingSource;

impl ChunkSource for PanickingSource {
    fn stream(&self, _input: &str) -> Result<ChunkIter, BridgeError> {
        panic!("model client crashed");
    }
}

/// Drains a session to the end.
pub async fn collect_frames(session: &mut StreamSession) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = session.next_frame().await {
        frames.push(frame);
    }
    frames
}

pub fn without_heartbeats(frames: Vec<Frame>) -> Vec<Frame> {
    frames
        .into_iter()
        .filter(|frame| *frame != Frame::Heartbeat)
        .collect()
}
