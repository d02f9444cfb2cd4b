//! Codec double with scriptable failures.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use bytes::Bytes;
use wiredispatch::{
    BincodeCodec,
    channel::Channel,
    codec::{Codec, CodecError},
    message::DecodedMessage,
    reply::Reply,
};

/// What the next decodes produce.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DecodeScript {
    /// Decode with [`BincodeCodec`].
    #[default]
    Pass,
    /// Fail with the given message.
    Fail(String),
    /// Report a message type that is neither request nor response.
    Unsupported(String),
}

/// [`BincodeCodec`] wrapper whose decode and encode can be made to fail.
#[derive(Debug, Default)]
pub struct ScriptedCodec {
    decode: Mutex<DecodeScript>,
    fail_encode: AtomicBool,
    decodes: AtomicUsize,
    last_peer_ip: Mutex<Option<String>>,
}

impl ScriptedCodec {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Script subsequent decodes.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn script_decode(&self, script: DecodeScript) {
        *self.decode.lock().expect("script lock") = script;
    }

    /// Make subsequent encodes fail.
    pub fn fail_encode(&self, fail: bool) { self.fail_encode.store(fail, Ordering::SeqCst); }

    /// Number of decode calls.
    #[must_use]
    pub fn decode_calls(&self) -> usize { self.decodes.load(Ordering::SeqCst) }

    /// Peer IP passed to the most recent decode.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn last_peer_ip(&self) -> Option<String> {
        self.last_peer_ip.lock().expect("peer lock").clone()
    }
}

impl Codec for ScriptedCodec {
    fn decode(
        &self,
        _channel: &dyn Channel,
        peer_ip: &str,
        payload: &[u8],
    ) -> Result<DecodedMessage, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        *self.last_peer_ip.lock().expect("peer lock") = Some(peer_ip.to_owned());
        match self.decode.lock().expect("script lock").clone() {
            DecodeScript::Pass => BincodeCodec.decode_payload(payload),
            DecodeScript::Fail(message) => Err(CodecError::decode(message)),
            DecodeScript::Unsupported(type_name) => Ok(DecodedMessage::Unsupported { type_name }),
        }
    }

    fn encode(&self, channel: &dyn Channel, reply: &Reply) -> Result<Bytes, CodecError> {
        if self.fail_encode.load(Ordering::SeqCst) {
            return Err(CodecError::encode("scripted encode failure"));
        }
        BincodeCodec.encode(channel, reply)
    }
}
