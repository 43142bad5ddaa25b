/// Dedicated rendering thread owning the device

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::device::ReadbackDevice;
use crate::error::{Error, Result};
use crate::scheduler::{RenderCommand, RenderDomain, RenderDomainGuard};

enum RenderMessage {
    Command(RenderCommand),
    Flush(Sender<()>),
    Shutdown,
}

/// Rendering domain backed by an OS thread
///
/// Commands travel over a channel and run in submission order. Dropping the
/// `RenderThread` runs every command already queued, then joins the thread.
pub struct RenderThread {
    device: Arc<dyn ReadbackDevice>,
    sender: Sender<RenderMessage>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(device: Arc<dyn ReadbackDevice>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<RenderMessage>();
        let thread_device = device.clone();

        let handle = thread::Builder::new()
            .name("readback-render".to_string())
            .spawn(move || {
                let _guard = RenderDomainGuard::enter();
                while let Ok(message) = receiver.recv() {
                    match message {
                        RenderMessage::Command(command) => command(thread_device.as_ref()),
                        RenderMessage::Flush(done) => {
                            let _ = done.send(());
                        }
                        RenderMessage::Shutdown => break,
                    }
                }
                crate::engine_debug!("readback::RenderThread", "Render thread exiting");
            })
            .map_err(|e| Error::InitializationFailed(format!("Failed to spawn render thread: {}", e)))?;

        crate::engine_info!("readback::RenderThread", "Render thread started");

        Ok(Self {
            device,
            sender,
            handle: Some(handle),
        })
    }

    pub fn device(&self) -> &Arc<dyn ReadbackDevice> {
        &self.device
    }

    /// Block until every command enqueued before this call has run
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.sender.send(RenderMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl RenderDomain for RenderThread {
    fn enqueue(&self, command: RenderCommand) {
        if self.sender.send(RenderMessage::Command(command)).is_err() {
            crate::engine_error!("readback::RenderThread", "Render thread is gone, command dropped");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        let _ = self.sender.send(RenderMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                crate::engine_error!("readback::RenderThread", "Render thread panicked");
            }
        }
    }
}

#[cfg(test)]
#[path = "render_thread_tests.rs"]
mod tests;
