use crate::event::ScanEvent;
use crate::forward::{Forwarder, Outcome};
use std::sync::Mutex;

type Script = Box<dyn Fn(&ScanEvent) -> Outcome + Send + Sync>;

/// Forwarder whose outcome per event is decided by a closure. Records every
/// event it was asked to send.
pub(crate) struct ScriptedForwarder {
    script: Script,
    sent: Mutex<Vec<ScanEvent>>,
}

impl ScriptedForwarder {
    pub fn new(script: impl Fn(&ScanEvent) -> Outcome + Send + Sync + 'static) -> Self {
        ScriptedForwarder {
            script: Box::new(script),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::new(move |_| outcome.clone())
    }

    pub fn sent(&self) -> Vec<ScanEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_cards(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|e| e.card_id.to_string())
            .collect()
    }
}

impl Forwarder for ScriptedForwarder {
    async fn send(&self, event: &ScanEvent) -> Outcome {
        self.sent.lock().unwrap().push(event.clone());
        (self.script)(event)
    }
}
