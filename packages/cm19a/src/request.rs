//! The query string command surface.
//!
//! Home automation front ends drive the transceiver with requests such as
//! `/?house=A&unit=1&command=ON` or `/?command=getqueue`. This module turns
//! such a request into a [`Request`] and its outcome into a status code and a
//! plain text body. Serving them over a socket is left to the caller.

use std::{fmt, str::FromStr};

use cm19a_protocol::{Action, CommandKey, HouseCode, InvalidHouseCode};
use log::debug;
use thiserror::Error;

use crate::{transceiver::Transceiver, transport::Transport};

pub const ACK: &str = "ACK";
pub const NAK: &str = "NAK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Send one command.
    Send(CommandKey),
    /// Take everything received so far.
    GetQueue,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("NAK: Invalid 'command' value")]
    InvalidCommand,

    #[error("NAK: Missing '{0}' value")]
    MissingField(&'static str),

    #[error("NAK: Invalid 'house' value")]
    InvalidHouseCode(#[from] InvalidHouseCode),
}

impl Request {
    /// Parses a request path or bare query string.
    ///
    /// Everything up to and including the first `?` is ignored and `%20` is
    /// read as a space. Pairs without an `=` are skipped and a repeated key
    /// keeps its last value.
    pub fn from_query(query: &str) -> Result<Self, RequestError> {
        let query = query
            .split_once('?')
            .map_or(query, |(_, query)| query)
            .replace("%20", " ");

        let mut house = None;
        let mut unit = None;
        let mut command = None;

        for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
            // Anything after a second `=` is dropped.
            let value = value.split('=').next().unwrap_or_default();
            match key {
                "house" => house = Some(value),
                "unit" => unit = Some(value),
                "command" => command = Some(value),
                _ => {}
            }
        }

        let command = command.ok_or(RequestError::InvalidCommand)?;
        if command.eq_ignore_ascii_case("getqueue") {
            return Ok(Request::GetQueue);
        }

        let action = Action::from_str(command).map_err(|_| RequestError::InvalidCommand)?;
        let house = house
            .filter(|house| !house.is_empty())
            .ok_or(RequestError::MissingField("house"))?
            .parse::<HouseCode>()?;
        let unit = unit
            .filter(|unit| !unit.is_empty())
            .ok_or(RequestError::MissingField("unit"))?;

        Ok(Request::Send(CommandKey::new(house, unit, action)))
    }
}

impl FromStr for Request {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_query(s)
    }
}

/// What to answer a request with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Parses `query` and carries it out against `transceiver`.
    pub async fn respond<T: Transport>(transceiver: &Transceiver<T>, query: &str) -> Self {
        match Request::from_query(query) {
            Ok(request) => Self::execute(transceiver, &request).await,
            Err(e) => {
                debug!("Rejected request {:?}: {}", query, e);
                Self::from(e)
            }
        }
    }

    pub async fn execute<T: Transport>(transceiver: &Transceiver<T>, request: &Request) -> Self {
        match request {
            Request::Send(key) => {
                if transceiver.send_command(key).await {
                    Self::new(200, ACK)
                } else {
                    Self::new(500, NAK)
                }
            }
            Request::GetQueue => {
                let events = transceiver.drain_queue();
                let body = events
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");

                Self::new(200, body)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<RequestError> for Response {
    fn from(value: RequestError) -> Self {
        Self::new(400, value.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.body)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cm19a_protocol::{Action, CommandKey, HouseCode};

    use super::{Request, RequestError, Response};
    use crate::{
        config::TransceiverConfig,
        mock::{sample_table, MockTransport},
        transceiver::Transceiver,
    };

    fn key(house: char, unit: &str, action: Action) -> CommandKey {
        CommandKey::new(HouseCode::new(house).unwrap(), unit, action)
    }

    async fn transceiver() -> (Transceiver<MockTransport>, MockTransport) {
        let mock = MockTransport::default();
        let config = TransceiverConfig::new(Duration::from_millis(10), false);
        let transceiver = Transceiver::from_parts(mock.clone(), sample_table(), config).await;
        (transceiver, mock)
    }

    #[test]
    fn parses_send_requests() {
        assert_eq!(
            Request::from_query("/?house=A&unit=1&command=ON"),
            Ok(Request::Send(key('A', "1", Action::On)))
        );
        assert_eq!(
            Request::from_query("house=b&unit=2&command=alloff"),
            Ok(Request::Send(key('B', "2", Action::AllOff)))
        );
        assert_eq!(
            "/x10?command=Bright&unit=all%20lights&house=c&junk".parse::<Request>(),
            Ok(Request::Send(key('C', "all lights", Action::Bright)))
        );
    }

    #[test]
    fn parses_getqueue() {
        assert_eq!(
            Request::from_query("/?command=getqueue"),
            Ok(Request::GetQueue)
        );
        assert_eq!(
            Request::from_query("command=GETQUEUE&house=A"),
            Ok(Request::GetQueue)
        );
    }

    #[test]
    fn rejects_bad_requests() {
        assert_eq!(
            Request::from_query("/?house=A&unit=1&command=toggle"),
            Err(RequestError::InvalidCommand)
        );
        assert_eq!(
            Request::from_query("/?house=A&unit=1"),
            Err(RequestError::InvalidCommand)
        );
        assert_eq!(
            Request::from_query("/?unit=1&command=on"),
            Err(RequestError::MissingField("house"))
        );
        assert_eq!(
            Request::from_query("/?house=A&unit=&command=on"),
            Err(RequestError::MissingField("unit"))
        );
        assert!(matches!(
            Request::from_query("/?house=AB&unit=1&command=on"),
            Err(RequestError::InvalidHouseCode(_))
        ));
    }

    #[tokio::test]
    async fn responds_to_sends() {
        let (transceiver, mock) = transceiver().await;

        assert_eq!(
            Response::respond(&transceiver, "/?house=a&unit=1&command=on").await,
            Response::new(200, "ACK")
        );
        assert_eq!(
            mock.written().last().unwrap(),
            &vec![0x14, 0x34, 0xCB, 0x58, 0xA7]
        );

        assert_eq!(
            Response::respond(&transceiver, "/?house=a&unit=7&command=on").await,
            Response::new(500, "NAK")
        );
        assert_eq!(
            Response::respond(&transceiver, "/?house=a&unit=1&command=quit").await,
            Response::new(400, "NAK: Invalid 'command' value")
        );
        assert_eq!(
            Response::respond(&transceiver, "/?command=on&unit=1")
                .await
                .status,
            400
        );
    }

    #[tokio::test]
    async fn getqueue_lists_received_events() {
        let (transceiver, mock) = transceiver().await;
        mock.push_inbound(&[0x14, 0x34, 0xCB, 0x58, 0xB7]);
        mock.push_inbound(&[9, 8]);
        transceiver.receive().await;
        transceiver.receive().await;

        let response = Response::respond(&transceiver, "/?command=getqueue").await;
        assert!(response.is_success());
        assert_eq!(response.body, "A1DIM\n9 8");

        let response = Response::respond(&transceiver, "/?command=getqueue").await;
        assert_eq!(response, Response::new(200, ""));
    }
}
