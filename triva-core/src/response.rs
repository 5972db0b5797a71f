//! The response record written by pipeline stages.
//!
//! A response accepts exactly one terminal action (`json`, `send`, `text`,
//! `redirect` or `end`). Repeating a terminal action is an error. Touching
//! the status or headers after the terminal action is remembered as a late
//! write, which the pipeline reports once the request completes.

use bytes::Bytes;
use serde::Serialize;

use crate::{Error, Headers};

pub const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
    sent: bool,
    late_writes: Vec<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
            sent: false,
            late_writes: Vec::new(),
        }
    }

    /// Set the status code for the upcoming terminal action.
    pub fn status(&mut self, code: u16) -> &mut Self {
        if self.sent {
            self.late_writes.push(format!("status {} after response was sent", code));
        } else {
            self.status = code;
        }
        self
    }

    /// Set a header, replacing previous values.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        if self.sent {
            self.late_writes
                .push(format!("header '{}' after response was sent", name));
        } else {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a header value next to existing ones.
    pub fn append_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let name = name.into();
        if self.sent {
            self.late_writes
                .push(format!("header '{}' after response was sent", name));
        } else {
            self.headers.append(name, value);
        }
        self
    }

    /// Serialize `value` as the JSON body and finish the response.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.ensure_unsent()?;
        let body = serde_json::to_vec(value)?;
        self.headers.insert("content-type", "application/json");
        self.finish(Bytes::from(body));
        Ok(())
    }

    /// Finish with a raw body. Defaults the content type to plain text.
    pub fn send(&mut self, body: impl Into<Bytes>) -> Result<(), Error> {
        self.ensure_unsent()?;
        if !self.headers.contains("content-type") {
            self.headers
                .insert("content-type", "text/plain; charset=utf-8");
        }
        self.finish(body.into());
        Ok(())
    }

    pub fn text(&mut self, body: impl Into<String>) -> Result<(), Error> {
        self.ensure_unsent()?;
        self.headers
            .insert("content-type", "text/plain; charset=utf-8");
        self.finish(Bytes::from(body.into()));
        Ok(())
    }

    /// Finish with a bodiless redirect to `location`.
    pub fn redirect(&mut self, location: impl Into<String>, status: u16) -> Result<(), Error> {
        self.ensure_unsent()?;
        if !REDIRECT_STATUSES.contains(&status) {
            return Err(Error::Internal(format!(
                "invalid redirect status code: {}",
                status
            )));
        }
        self.status = status;
        self.headers.insert("location", location);
        self.headers.insert("content-length", "0");
        self.finish(Bytes::new());
        Ok(())
    }

    /// Finish with the current status and an empty body.
    pub fn end(&mut self) -> Result<(), Error> {
        self.ensure_unsent()?;
        self.finish(Bytes::new());
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parse the body as JSON; mostly useful in tests.
    pub fn body_json(&self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Drain the writes that arrived after the terminal action.
    pub fn take_late_writes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.late_writes)
    }

    /// Replace an unsent response with an error body built by the pipeline.
    pub(crate) fn force_json(&mut self, status: u16, body: &serde_json::Value) {
        self.status = status;
        self.headers.insert("content-type", "application/json");
        self.body = Bytes::from(body.to_string());
        self.sent = true;
    }

    fn ensure_unsent(&self) -> Result<(), Error> {
        if self.sent {
            Err(Error::ResponseAlreadySent)
        } else {
            Ok(())
        }
    }

    fn finish(&mut self, body: Bytes) {
        self.body = body;
        self.sent = true;
    }
}
