//! Dedicated sound thread.
//!
//! Ticks every audio frame. Each tick runs the begin-frame callbacks (where
//! clients merge sound parameters), executes the hardware frame and then runs
//! the end-frame callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atk_core::constants::SOUND_FRAME_INTERVAL_USEC;
use atk_core::Result;
use crossbeam_channel::{select, tick, unbounded, Sender};
use tracing::{debug, info, warn};

use crate::manager::HardwareManager;

/// Per-frame hooks run on the sound thread.
pub trait SoundFrameCallback: Send {
    fn on_begin_sound_frame(&mut self) {}

    fn on_end_sound_frame(&mut self) {}
}

enum Command {
    Register(Box<dyn SoundFrameCallback>),
    Shutdown,
}

pub struct SoundThread {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
    frames: Arc<AtomicU64>,
}

impl SoundThread {
    /// Start the thread for `hardware`.
    ///
    /// Returns `Ok(None)` when the sound thread is disabled in the hardware
    /// parameter; the caller then drives frames itself.
    pub fn spawn(hardware: Arc<HardwareManager>) -> Result<Option<Self>> {
        if !hardware.parameter().is_sound_thread_enabled {
            debug!("Sound thread disabled");
            return Ok(None);
        }

        let (tx, rx) = unbounded::<Command>();
        let frames = Arc::new(AtomicU64::new(0));
        let frame_counter = frames.clone();

        let handle = thread::Builder::new().name("atk-sound".into()).spawn(move || {
            let ticker = tick(Duration::from_micros(SOUND_FRAME_INTERVAL_USEC));
            let mut callbacks: Vec<Box<dyn SoundFrameCallback>> = Vec::new();
            info!("Sound thread started");

            loop {
                select! {
                    recv(rx) -> msg => match msg {
                        Ok(Command::Register(cb)) => callbacks.push(cb),
                        Ok(Command::Shutdown) | Err(_) => break,
                    },
                    recv(ticker) -> _ => {
                        for cb in callbacks.iter_mut() {
                            cb.on_begin_sound_frame();
                        }
                        if let Err(e) = hardware.execute_audio_renderer_rendering() {
                            warn!("Audio frame failed: {}", e);
                        }
                        for cb in callbacks.iter_mut() {
                            cb.on_end_sound_frame();
                        }
                        frame_counter.fetch_add(1, Ordering::Relaxed);
                    },
                }
            }

            info!("Sound thread stopped");
        })?;

        Ok(Some(Self {
            tx,
            handle: Some(handle),
            frames,
        }))
    }

    pub fn register_callback(&self, callback: Box<dyn SoundFrameCallback>) {
        let _ = self.tx.send(Command::Register(callback));
    }

    /// Frames executed so far.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stop ticking and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("Sound thread panicked");
            }
        }
    }
}

impl Drop for SoundThread {
    fn drop(&mut self) {
        self.stop();
    }
}
