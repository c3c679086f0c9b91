//! [`WsFrame`] for the tungstenite and axum message types

use bytes::Bytes;
use std::borrow::Cow;
use wsproxy_relay::{CloseSignal, Inbound};

use crate::message::{close_reason, WsFrame};

impl WsFrame for tokio_tungstenite::tungstenite::Message {
    fn into_inbound(self) -> Option<Inbound> {
        use tokio_tungstenite::tungstenite::Message;

        match self {
            Message::Binary(data) => Some(Inbound::Data(Bytes::from(data))),
            Message::Text(text) => Some(Inbound::Data(Bytes::from(text.into_bytes()))),
            Message::Close(frame) => Some(Inbound::Close(
                frame
                    .map(|f| CloseSignal::new(u16::from(f.code), f.reason.into_owned()))
                    .unwrap_or_else(CloseSignal::no_status),
            )),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }

    fn binary(chunk: &[u8]) -> Self {
        Self::Binary(chunk.to_vec())
    }

    fn close(signal: &CloseSignal) -> Self {
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        Self::Close(Some(CloseFrame {
            code: CloseCode::from(signal.code),
            reason: Cow::Owned(close_reason(&signal.reason).to_string()),
        }))
    }
}

impl WsFrame for axum::extract::ws::Message {
    fn into_inbound(self) -> Option<Inbound> {
        use axum::extract::ws::Message;

        match self {
            Message::Binary(data) => Some(Inbound::Data(data)),
            Message::Text(text) => Some(Inbound::Data(Bytes::copy_from_slice(
                text.as_str().as_bytes(),
            ))),
            Message::Close(frame) => Some(Inbound::Close(
                frame
                    .map(|f| CloseSignal::new(f.code, f.reason.as_str()))
                    .unwrap_or_else(CloseSignal::no_status),
            )),
            Message::Ping(_) | Message::Pong(_) => None,
        }
    }

    fn binary(chunk: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(chunk))
    }

    fn close(signal: &CloseSignal) -> Self {
        Self::Close(Some(axum::extract::ws::CloseFrame {
            code: signal.code,
            reason: close_reason(&signal.reason).to_string().into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_tungstenite_data_frames() {
        assert_eq!(
            Message::Binary(b"abc".to_vec()).into_inbound(),
            Some(Inbound::Data(Bytes::from_static(b"abc")))
        );
        assert_eq!(
            Message::Text("hi".to_string()).into_inbound(),
            Some(Inbound::Data(Bytes::from_static(b"hi")))
        );
        assert_eq!(Message::Ping(vec![1]).into_inbound(), None);
        assert_eq!(Message::Pong(vec![1]).into_inbound(), None);
    }

    #[test]
    fn test_tungstenite_close_frames() {
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: Cow::Borrowed("boom"),
        }));
        assert_eq!(
            frame.into_inbound(),
            Some(Inbound::Close(CloseSignal::internal_error("boom")))
        );
        assert_eq!(
            Message::Close(None).into_inbound(),
            Some(Inbound::Close(CloseSignal::no_status()))
        );

        match <Message as WsFrame>::close(&CloseSignal::going_away("client has closed connection")) {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason, "client has closed connection");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[test]
    fn test_axum_frames() {
        use axum::extract::ws::{CloseFrame, Message};

        assert_eq!(
            Message::Binary(Bytes::from_static(b"xyz")).into_inbound(),
            Some(Inbound::Data(Bytes::from_static(b"xyz")))
        );
        assert_eq!(Message::Ping(Bytes::new()).into_inbound(), None);

        let close = Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "bye".into(),
        }));
        assert_eq!(
            close.into_inbound(),
            Some(Inbound::Close(CloseSignal::new(1000, "bye")))
        );

        match <Message as WsFrame>::close(&CloseSignal::internal_error("Can not read from dest")) {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1011);
                assert_eq!(frame.reason.as_str(), "Can not read from dest");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
