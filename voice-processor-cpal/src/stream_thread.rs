//! Dedicated thread that owns a cpal `Stream` for its whole lifetime.
//!
//! Host streams are not `Send` on every platform, so the stream is built,
//! played, paused and dropped on the same thread. The owner only holds a
//! stop channel and the join handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::StreamTrait;

use voice_processor_core::models::error::EngineError;

pub(crate) struct StreamThread {
    running: Arc<AtomicBool>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StreamThread {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn `name`, build and play the stream there, and return once it
    /// is playing or has failed to.
    pub fn start<F>(&mut self, name: &str, build: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<cpal::Stream, EngineError> + Send + 'static,
    {
        if self.is_running() || self.handle.is_some() {
            return Err(EngineError::StreamFailed("stream already running".into()));
        }

        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), EngineError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let label = name.to_string();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = build().and_then(|stream| {
                    stream
                        .play()
                        .map_err(|e| EngineError::StreamFailed(format!("failed to start stream: {}", e)))?;
                    Ok(stream)
                });
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                running.store(true, Ordering::Release);
                let _ = ready_tx.send(Ok(()));

                // Parks until stop is signalled or the owner is dropped.
                let _ = stop_rx.recv();

                if let Err(e) = stream.pause() {
                    log::warn!("{} pause failed: {}", label, e);
                }
                drop(stream);
                running.store(false, Ordering::Release);
            })
            .map_err(|e| EngineError::StreamFailed(format!("failed to spawn stream thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::StreamFailed("stream thread exited before starting".into()))
            }
        }
    }

    /// Signal the thread and wait for the stream to be dropped.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let joined = match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EngineError::StreamFailed("stream thread panicked".into())),
            None => Ok(()),
        };
        self.running.store(false, Ordering::Release);
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_build_is_reported_and_thread_joined() {
        let mut thread = StreamThread::new();
        let err = thread
            .start("test-stream", || Err(EngineError::DeviceUnavailable("gone".into())))
            .unwrap_err();

        assert_eq!(err, EngineError::DeviceUnavailable("gone".into()));
        assert!(!thread.is_running());
        assert!(thread.stop().is_ok());
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut thread = StreamThread::new();
        assert!(thread.stop().is_ok());
        assert!(!thread.is_running());
    }
}
