//! Scripted transport for session and coordinator tests.

use crate::transport::{Connection, MessageStream, Transport};
use core::time::Duration;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use streamload_core::{
    Error, Result,
    proto::{HelloReply, HelloRequest},
};
use tonic::Status;

/// A transport interaction, recorded in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Dial,
    Greet(String),
    Open,
    Send(String),
    Recv,
    CloseSend,
}

/// What the next `recv` on a scripted stream does.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Step {
    Reply(&'static str),
    Eof,
    Fail,
    /// Sleeps, then moves on to the following step.
    Delay(Duration),
}

/// Behavior shared by every connection a [`MockTransport`] dials.
///
/// Once the steps run out, `recv` never resolves.
#[derive(Clone, Debug, Default)]
pub(crate) struct Script {
    pub steps: Vec<Step>,
    pub dial_error: bool,
    pub greet_error: bool,
    pub open_error: bool,
    pub send_error: bool,
    pub close_error: bool,
}

#[derive(Debug)]
pub(crate) struct MockTransport {
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockTransport {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn record(calls: &Mutex<Vec<Call>>, call: Call) {
    calls.lock().unwrap().push(call);
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn dial(&self) -> Result<MockConnection> {
        record(&self.calls, Call::Dial);
        if self.script.dial_error {
            return Err(Error::ConnectTimeout {
                addr: "mock:7788".to_string(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(MockConnection {
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        })
    }
}

pub(crate) struct MockConnection {
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Connection for MockConnection {
    type Stream = MockStream;

    async fn say_hello(&mut self, name: &str) -> Result<String> {
        record(&self.calls, Call::Greet(name.to_string()));
        if self.script.greet_error {
            return Err(Error::Greeting(Status::unavailable("greeter down")));
        }
        Ok(format!("Hello {name}"))
    }

    async fn open_stream(&mut self) -> Result<MockStream> {
        record(&self.calls, Call::Open);
        if self.script.open_error {
            return Err(Error::StreamOpen {
                context: "connection refused".to_string(),
            });
        }
        Ok(MockStream {
            steps: self.script.steps.iter().copied().collect(),
            send_error: self.script.send_error,
            close_error: self.script.close_error,
            calls: Arc::clone(&self.calls),
        })
    }
}

pub(crate) struct MockStream {
    steps: VecDeque<Step>,
    send_error: bool,
    close_error: bool,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MessageStream for MockStream {
    async fn send(&mut self, request: HelloRequest) -> Result<()> {
        record(&self.calls, Call::Send(request.name));
        if self.send_error {
            return Err(Error::Send {
                context: "broken pipe".to_string(),
            });
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<HelloReply>> {
        record(&self.calls, Call::Recv);
        loop {
            match self.steps.pop_front() {
                Some(Step::Reply(message)) => {
                    return Ok(Some(HelloReply {
                        message: message.to_string(),
                    }));
                }
                Some(Step::Eof) => return Ok(None),
                Some(Step::Fail) => return Err(Error::Receive(Status::internal("stream reset"))),
                Some(Step::Delay(delay)) => tokio::time::sleep(delay).await,
                None => core::future::pending::<()>().await,
            }
        }
    }

    async fn close_send(&mut self) -> Result<()> {
        record(&self.calls, Call::CloseSend);
        if self.close_error {
            return Err(Error::CloseSend {
                context: "stream already reset".to_string(),
            });
        }
        Ok(())
    }
}
