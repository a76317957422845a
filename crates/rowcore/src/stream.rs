use crate::Value;
use futures_util::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;

/// Lazily-produced output sequence: finite or unbounded, not restartable.
///
/// Whoever holds the stream owns closing it — dropping it releases the
/// producer. Once [`drain`](OutputStream::drain) or a `next_chunk` returning
/// `None` has run, the stream is consumed and yields nothing further.
pub struct OutputStream {
    inner: Pin<Box<dyn Stream<Item = Value> + Send>>,
    consumed: bool,
}

impl OutputStream {
    pub fn new(stream: impl Stream<Item = Value> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
            consumed: false,
        }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(futures_util::stream::iter(values))
    }

    /// Pull the next chunk; `None` marks the producer exhausted.
    pub async fn next_chunk(&mut self) -> Option<Value> {
        if self.consumed {
            return None;
        }
        match self.inner.next().await {
            Some(value) => Some(value),
            None => {
                self.consumed = true;
                None
            }
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Consume the whole producer into a single value. String chunks are
    /// concatenated into one string; anything else collects into an array.
    pub async fn drain(mut self) -> Value {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            chunks.push(chunk);
        }
        if !chunks.is_empty() && chunks.iter().all(|c| matches!(c, Value::String(_))) {
            let mut text = String::new();
            for chunk in chunks {
                if let Value::String(s) = chunk {
                    text.push_str(&s);
                }
            }
            Value::String(text)
        } else {
            Value::Array(chunks)
        }
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

/// A node or flow output: an eager value, or a lazy producer whose closing
/// ownership travels with it.
#[derive(Debug)]
pub enum Output {
    Value(Value),
    Stream(OutputStream),
}

impl Output {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(v) => Some(v),
            Output::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Output::Stream(_))
    }

    /// Materialize to an eager value, draining a lazy producer if needed.
    pub async fn into_value(self) -> Value {
        match self {
            Output::Value(v) => v,
            Output::Stream(s) => s.drain().await,
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}
