use ibex_core::{serialize, Address, CoreError, Preprepare, Sig, Subject, View};
use serde::{Deserialize, Serialize};

/// Message codes; the discriminants are the wire numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageCode {
    Preprepare = 0,
    Prepare = 1,
    Commit = 2,
    Checkpoint = 3,
    RoundChange = 4,
}

/// Signed envelope exchanged between validators.
///
/// `msg` holds the encoded typed payload. The signature covers
/// `(code, msg, address)` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub code: MessageCode,
    pub msg: Vec<u8>,
    pub address: Address,
    pub signature: Sig,
}

#[derive(Serialize)]
struct SigningPayload<'a> {
    code: MessageCode,
    msg: &'a [u8],
    address: &'a Address,
}

impl Message {
    /// Unsigned message; sign with the bytes from [`Message::payload_for_signing`]
    pub fn new(code: MessageCode, msg: Vec<u8>, address: Address) -> Self {
        Message {
            code,
            msg,
            address,
            signature: Sig::default(),
        }
    }

    pub fn payload_for_signing(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(&SigningPayload {
            code: self.code,
            msg: &self.msg,
            address: &self.address,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        serialize::from_bytes(bytes)
    }

    /// Decode `msg` into the payload type `code` announces
    pub fn decode_payload(&self) -> Result<Payload, CoreError> {
        let payload = match self.code {
            MessageCode::Preprepare => Payload::Preprepare(serialize::from_bytes(&self.msg)?),
            MessageCode::Prepare => Payload::Prepare(serialize::from_bytes(&self.msg)?),
            MessageCode::Commit => Payload::Commit(serialize::from_bytes(&self.msg)?),
            MessageCode::Checkpoint => Payload::Checkpoint(serialize::from_bytes(&self.msg)?),
            MessageCode::RoundChange => Payload::RoundChange(serialize::from_bytes(&self.msg)?),
        };
        Ok(payload)
    }
}

/// Typed message contents, one variant per code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Preprepare(Preprepare),
    Prepare(Subject),
    Commit(Subject),
    Checkpoint(Subject),
    RoundChange(Subject),
}

impl Payload {
    pub fn code(&self) -> MessageCode {
        match self {
            Payload::Preprepare(_) => MessageCode::Preprepare,
            Payload::Prepare(_) => MessageCode::Prepare,
            Payload::Commit(_) => MessageCode::Commit,
            Payload::Checkpoint(_) => MessageCode::Checkpoint,
            Payload::RoundChange(_) => MessageCode::RoundChange,
        }
    }

    pub fn view(&self) -> View {
        match self {
            Payload::Preprepare(p) => p.view,
            Payload::Prepare(s)
            | Payload::Commit(s)
            | Payload::Checkpoint(s)
            | Payload::RoundChange(s) => s.view,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        match self {
            Payload::Preprepare(p) => serialize::to_bytes(p),
            Payload::Prepare(s)
            | Payload::Commit(s)
            | Payload::Checkpoint(s)
            | Payload::RoundChange(s) => serialize::to_bytes(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibex_core::{sign, verify, Block, Hash, KeyPair};

    fn signed(kp: &KeyPair, payload: &Payload) -> Message {
        let mut message = Message::new(payload.code(), payload.encode().unwrap(), kp.address);
        let data = message.payload_for_signing().unwrap();
        message.signature = sign(&kp.secret, &data);
        message
    }

    #[test]
    fn test_envelope_decode_and_verify() {
        let kp = KeyPair::generate();
        let subject = Subject {
            view: View::new(5, 1),
            digest: Hash::new([3u8; 32]),
        };
        let message = signed(&kp, &Payload::Commit(subject));

        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.decode_payload().unwrap(), Payload::Commit(subject));

        let data = decoded.payload_for_signing().unwrap();
        verify(&kp.public, &data, &decoded.signature).unwrap();
    }

    #[test]
    fn test_signature_does_not_cover_other_sender() {
        let kp = KeyPair::generate();
        let impostor = KeyPair::generate();
        let subject = Subject {
            view: View::new(1, 0),
            digest: Hash::ZERO,
        };
        let mut message = signed(&kp, &Payload::Prepare(subject));
        message.address = impostor.address;

        let data = message.payload_for_signing().unwrap();
        assert!(verify(&kp.public, &data, &message.signature).is_err());
    }

    #[test]
    fn test_preprepare_payload_view() {
        let block = Block::new(2, Hash::ZERO, 0, Address::ZERO, vec![7]);
        let payload = Payload::Preprepare(Preprepare::new(View::new(2, 3), block));
        assert_eq!(payload.code(), MessageCode::Preprepare);
        assert_eq!(payload.view(), View::new(2, 3));
    }

    #[test]
    fn test_payload_mismatching_code_fails() {
        let kp = KeyPair::generate();
        // A non-zero first digest byte is not a valid Option tag
        let subject = Subject {
            view: View::new(1, 0),
            digest: Hash::new([3u8; 32]),
        };
        let mut message = signed(&kp, &Payload::Prepare(subject));
        message.code = MessageCode::Preprepare;
        assert!(message.decode_payload().is_err());
    }
}
