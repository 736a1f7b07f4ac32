//! Scripted adapter for supervisor and binding tests.
//!
//! Every adapter the factory creates records its calls and exposes its
//! [`EventSink`], so a test can play the remote side by emitting events.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::auth::ConnectHeaders;
use crate::error::{Error, Result};
use crate::identifiers::{Generation, SubscriptionId, Topic};

use super::adapter::{AdapterFactory, AdapterPhase, TransportAdapter, TransportKind};
use super::event::EventSink;

/// A call observed on a mock adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockCall {
    Connect {
        generation: Generation,
        authorization: Option<String>,
    },
    Subscribe {
        generation: Generation,
        topic: Topic,
    },
    Unsubscribe {
        generation: Generation,
        topic: Topic,
    },
    Disconnect {
        generation: Generation,
    },
}

#[derive(Debug, Default)]
struct MockLog {
    sinks: Vec<EventSink>,
    calls: Vec<MockCall>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockFactory {
    endpoint: Url,
    log: Arc<Mutex<MockLog>>,
}

impl MockFactory {
    pub(crate) fn new(endpoint: &str) -> Self {
        Self {
            endpoint: Url::parse(endpoint).expect("mock endpoint"),
            log: Arc::default(),
        }
    }

    /// Number of adapters created so far.
    pub(crate) fn created(&self) -> usize {
        self.log.lock().sinks.len()
    }

    /// Sink of the most recently created adapter.
    pub(crate) fn latest(&self) -> EventSink {
        self.log.lock().sinks.last().cloned().expect("no adapter created")
    }

    /// Sink of the `index`-th adapter.
    pub(crate) fn sink(&self, index: usize) -> EventSink {
        self.log.lock().sinks[index].clone()
    }

    pub(crate) fn calls(&self) -> Vec<MockCall> {
        self.log.lock().calls.clone()
    }

    pub(crate) fn subscriptions(&self, generation: Generation) -> Vec<Topic> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Subscribe { generation: g, topic } if g == generation => Some(topic),
                _ => None,
            })
            .collect()
    }
}

impl AdapterFactory for MockFactory {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn create(&self, sink: EventSink) -> Box<dyn TransportAdapter> {
        self.log.lock().sinks.push(sink.clone());
        Box::new(MockAdapter {
            sink,
            log: Arc::clone(&self.log),
            phase: AdapterPhase::New,
        })
    }
}

struct MockAdapter {
    sink: EventSink,
    log: Arc<Mutex<MockLog>>,
    phase: AdapterPhase,
}

impl MockAdapter {
    fn record(&self, call: MockCall) {
        self.log.lock().calls.push(call);
    }
}

#[async_trait]
impl TransportAdapter for MockAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn connect(&mut self, _endpoint: &Url, headers: &ConnectHeaders) -> Result<()> {
        match self.phase {
            AdapterPhase::Active => return Ok(()),
            AdapterPhase::Stopped => return Err(Error::ConnectionClosed),
            AdapterPhase::New => {}
        }
        self.phase = AdapterPhase::Active;
        self.record(MockCall::Connect {
            generation: self.sink.generation(),
            authorization: headers.get("Authorization").map(str::to_owned),
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &Topic) -> Result<SubscriptionId> {
        self.record(MockCall::Subscribe {
            generation: self.sink.generation(),
            topic: topic.clone(),
        });
        Ok(SubscriptionId::new(topic.as_str()))
    }

    fn unsubscribe(&mut self, topic: &Topic) -> Result<()> {
        self.record(MockCall::Unsubscribe {
            generation: self.sink.generation(),
            topic: topic.clone(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.phase == AdapterPhase::Stopped {
            return;
        }
        self.phase = AdapterPhase::Stopped;
        self.sink.mute();
        self.record(MockCall::Disconnect {
            generation: self.sink.generation(),
        });
    }
}
