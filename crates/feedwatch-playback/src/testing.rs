//! Recording sink for tests.

use std::sync::Arc;

use parking_lot::Mutex;

use feedwatch_ipc::LoadToken;

use crate::sink::{LoadRequest, MediaSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Load {
        token: LoadToken,
        looping: bool,
        force_reload: bool,
    },
    Cancel {
        token: LoadToken,
    },
    Play {
        token: LoadToken,
        autoplay: bool,
    },
    Pause {
        token: LoadToken,
    },
    Unload,
}

/// Sink that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }
}

impl MediaSink for RecordingSink {
    fn load(&mut self, request: &LoadRequest) {
        self.calls.lock().push(SinkCall::Load {
            token: request.token,
            looping: request.looping,
            force_reload: request.force_reload,
        });
    }

    fn cancel(&mut self, token: LoadToken) {
        self.calls.lock().push(SinkCall::Cancel { token });
    }

    fn play(&mut self, token: LoadToken, autoplay: bool) {
        self.calls.lock().push(SinkCall::Play { token, autoplay });
    }

    fn pause(&mut self, token: LoadToken) {
        self.calls.lock().push(SinkCall::Pause { token });
    }

    fn unload(&mut self) {
        self.calls.lock().push(SinkCall::Unload);
    }
}
