use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::domain::job::job::JobEvent;

/// Columns of the job trace, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TraceParameter {
    /// Milliseconds since the tracer started.
    Time,

    /// What happened: "DISPATCH", "END", "TASK".
    Event,

    TaskId,

    JobId,

    Worker,

    Signature,

    /// Job status or final task outcome.
    Status,

    /// Wall time of the job in ms.
    ElapsedMs,

    Attempt,

    Message,
}

impl TraceParameter {
    pub const ALL: [TraceParameter; 10] = [
        TraceParameter::Time,
        TraceParameter::Event,
        TraceParameter::TaskId,
        TraceParameter::JobId,
        TraceParameter::Worker,
        TraceParameter::Signature,
        TraceParameter::Status,
        TraceParameter::ElapsedMs,
        TraceParameter::Attempt,
        TraceParameter::Message,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TraceParameter::Time => "Time",
            TraceParameter::Event => "Event",
            TraceParameter::TaskId => "TaskId",
            TraceParameter::JobId => "JobId",
            TraceParameter::Worker => "Worker",
            TraceParameter::Signature => "Signature",
            TraceParameter::Status => "Status",
            TraceParameter::ElapsedMs => "ElapsedMs",
            TraceParameter::Attempt => "Attempt",
            TraceParameter::Message => "Message",
        }
    }

    pub fn headers() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.name()).collect()
    }
}

/// Values are kept native and only formatted by the writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for TraceValue {
    fn from(v: i64) -> Self {
        TraceValue::Integer(v)
    }
}

impl From<u64> for TraceValue {
    fn from(v: u64) -> Self {
        TraceValue::Integer(v as i64)
    }
}

impl From<u32> for TraceValue {
    fn from(v: u32) -> Self {
        TraceValue::Integer(v as i64)
    }
}

impl From<String> for TraceValue {
    fn from(v: String) -> Self {
        TraceValue::Text(v)
    }
}

impl From<&str> for TraceValue {
    fn from(v: &str) -> Self {
        TraceValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceEvent {
    data: HashMap<TraceParameter, TraceValue>,
}

impl TraceEvent {
    pub fn new(kind: &str) -> Self {
        let mut event = TraceEvent::default();
        event.set(TraceParameter::Event, kind);
        event
    }

    pub fn set<V: Into<TraceValue>>(&mut self, param: TraceParameter, value: V) -> &mut Self {
        self.data.insert(param, value.into());
        self
    }

    pub fn get(&self, param: TraceParameter) -> Option<&TraceValue> {
        self.data.get(&param)
    }

    pub fn job_end(event: &JobEvent) -> Self {
        let mut trace = TraceEvent::new("END");
        trace
            .set(TraceParameter::TaskId, event.task_id.to_string())
            .set(TraceParameter::JobId, event.job_id.to_string())
            .set(TraceParameter::Worker, event.worker.to_string())
            .set(TraceParameter::Signature, event.signature.as_str())
            .set(TraceParameter::Status, event.status.to_string())
            .set(TraceParameter::ElapsedMs, event.elapsed.as_millis() as u64);
        if let Some(message) = &event.message {
            trace.set(TraceParameter::Message, message.as_str());
        }
        trace
    }

    fn row(&self) -> Vec<String> {
        TraceParameter::ALL
            .iter()
            .map(|p| match self.data.get(p) {
                Some(TraceValue::Integer(i)) => i.to_string(),
                Some(TraceValue::Text(t)) => t.clone(),
                None => "NA".to_string(),
            })
            .collect()
    }
}

enum TraceMessage {
    Log(TraceEvent),
    Flush,
    Shutdown,
}

/// Writes job trace rows to a `;` separated CSV file from a background thread, so the dispatch path never
/// blocks on disk.
#[derive(Debug)]
pub struct JobTracer {
    sender: mpsc::Sender<TraceMessage>,
    started: Instant,
    writer: Option<JoinHandle<()>>,
}

impl JobTracer {
    /// Starts tracing into `path`, or to stdout when no path is given.
    pub fn init(path: Option<PathBuf>) -> io::Result<Self> {
        let output: Box<dyn Write + Send> = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Box::new(File::create(path)?)
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::with_writer(output))
    }

    pub fn with_writer(output: Box<dyn Write + Send>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let writer = thread::spawn(move || Self::writer_loop(receiver, output));
        JobTracer { sender, started: Instant::now(), writer: Some(writer) }
    }

    fn writer_loop(receiver: mpsc::Receiver<TraceMessage>, output: Box<dyn Write + Send>) {
        let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(output);

        if let Err(e) = csv_wtr.write_record(TraceParameter::headers()) {
            log::error!("Trace: failed to write headers: {}", e);
        }

        for message in receiver {
            match message {
                TraceMessage::Log(event) => {
                    if let Err(e) = csv_wtr.write_record(event.row()) {
                        log::error!("Trace: failed to write record: {}", e);
                    }
                }
                TraceMessage::Flush => {
                    let _ = csv_wtr.flush();
                }
                TraceMessage::Shutdown => break,
            }
        }
        let _ = csv_wtr.flush();
    }

    /// Queues one row. Never blocks; rows sent after shutdown are dropped.
    pub fn add_event(&self, mut event: TraceEvent) {
        if event.get(TraceParameter::Time).is_none() {
            event.set(TraceParameter::Time, self.started.elapsed().as_millis() as u64);
        }
        let _ = self.sender.send(TraceMessage::Log(event));
    }

    pub fn flush(&self) {
        let _ = self.sender.send(TraceMessage::Flush);
    }

    /// Writes everything queued so far and stops the writer thread.
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(TraceMessage::Shutdown);
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::error!("Trace writer thread panicked.");
            }
        }
    }
}

impl Drop for JobTracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
