//! In-memory encoder used by the lifecycle tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    sync::oneshot,
};

use crate::encoder::{EncoderLauncher, ExitReport, LaunchedEncoder, ProcessControl};

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum Behaviour {
    /// Exits (code 255) as soon as it is interrupted.
    ExitOnInterrupt,
    /// Ignores both interrupt and kill.
    Stubborn,
    /// The interrupt cannot be delivered; a kill works.
    NoInterrupt,
}

struct FakeState {
    stderr: Option<DuplexStream>,
    exit: Option<oneshot::Sender<ExitReport>>,
}

pub(crate) struct FakeEncoder {
    pub(crate) args: Vec<String>,
    behaviour: Behaviour,
    state: Mutex<FakeState>,
    pub(crate) interrupts: AtomicUsize,
    pub(crate) kills: AtomicUsize,
}

impl FakeEncoder {
    pub(crate) async fn write_line(&self, line: &str) {
        let mut stderr = self.state.lock().stderr.take().unwrap();
        stderr.write_all(line.as_bytes()).await.unwrap();
        stderr.write_all(b"\n").await.unwrap();
        self.state.lock().stderr = Some(stderr);
    }

    pub(crate) fn exit(&self, success: bool, code: Option<i32>) {
        let mut state = self.state.lock();
        state.stderr.take();
        if let Some(tx) = state.exit.take() {
            let _ = tx.send(ExitReport { success, code });
        }
    }
}

impl ProcessControl for FakeEncoder {
    fn request_graceful_stop(&self) -> io::Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::ExitOnInterrupt => {
                self.exit(false, Some(255));
                Ok(())
            }
            Behaviour::Stubborn => Ok(()),
            Behaviour::NoInterrupt => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "interrupt not supported",
            )),
        }
    }

    fn force_kill(&self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.behaviour != Behaviour::Stubborn {
            self.exit(false, None);
        }
        Ok(())
    }
}

pub(crate) struct FakeLauncher {
    behaviour: Behaviour,
    fail: bool,
    launched: Mutex<Vec<Arc<FakeEncoder>>>,
}

impl FakeLauncher {
    pub(crate) fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            fail: false,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Behaviour::ExitOnInterrupt)
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.launched.lock().len()
    }

    pub(crate) fn last(&self) -> Arc<FakeEncoder> {
        self.launched.lock().last().cloned().unwrap()
    }
}

impl EncoderLauncher for FakeLauncher {
    fn launch(&self, args: &[String]) -> io::Result<LaunchedEncoder> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no encoder"));
        }
        assert!(args.iter().any(|a| a == "-i"));

        let (writer, reader) = tokio::io::duplex(4096);
        let (tx, rx) = oneshot::channel();
        let encoder = Arc::new(FakeEncoder {
            args: args.to_vec(),
            behaviour: self.behaviour,
            state: Mutex::new(FakeState {
                stderr: Some(writer),
                exit: Some(tx),
            }),
            interrupts: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
        });
        self.launched.lock().push(Arc::clone(&encoder));

        Ok(LaunchedEncoder {
            control: encoder,
            diagnostics: Box::new(reader),
            exit: async move { rx.await.map_err(io::Error::other) }.boxed(),
        })
    }
}
