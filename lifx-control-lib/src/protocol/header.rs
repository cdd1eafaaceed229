use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::device::Serial;
use crate::error::CodecError;
use crate::protocol::message::Message;
use crate::protocol::{HEADER_SIZE, PROTOCOL_NUMBER};

const ADDRESSABLE_BIT: u16 = 1 << 12;
const TAGGED_BIT: u16 = 1 << 13;
const PROTOCOL_MASK: u16 = 0x0fff;
const RES_REQUIRED_BIT: u8 = 0x01;
const ACK_REQUIRED_BIT: u8 = 0x02;

/// The fixed 36-byte header in front of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total datagram length including this header.
    pub size: u16,
    /// Broadcast; receivers ignore `target`.
    pub tagged: bool,
    pub source: u32,
    /// Serial followed by two zero bytes, all zero when tagged.
    pub target: [u8; 8],
    /// Ask for a state reply.
    pub res_required: bool,
    /// Ask for an Acknowledgement (45).
    pub ack_required: bool,
    pub sequence: u8,
    pub message_type: u16,
}

impl Header {
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut protocol = PROTOCOL_NUMBER | ADDRESSABLE_BIT;
        if self.tagged {
            protocol |= TAGGED_BIT;
        }
        let mut flags = 0u8;
        if self.res_required {
            flags |= RES_REQUIRED_BIT;
        }
        if self.ack_required {
            flags |= ACK_REQUIRED_BIT;
        }

        // frame
        buf.put_u16_le(self.size);
        buf.put_u16_le(protocol);
        buf.put_u32_le(self.source);
        // frame address
        buf.put_slice(&self.target);
        buf.put_bytes(0, 6);
        buf.put_u8(flags);
        buf.put_u8(self.sequence);
        // protocol header
        buf.put_u64_le(0);
        buf.put_u16_le(self.message_type);
        buf.put_u16_le(0);
    }

    /// Validates and decodes the header at the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Header, CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::TooShort(data.len()));
        }
        let mut buf = &data[..HEADER_SIZE];
        let size = buf.get_u16_le();
        let protocol = buf.get_u16_le();
        if protocol & PROTOCOL_MASK != PROTOCOL_NUMBER {
            return Err(CodecError::WrongProtocol(protocol & PROTOCOL_MASK));
        }
        if (size as usize) < HEADER_SIZE || size as usize > data.len() {
            return Err(CodecError::BadSize {
                declared: size as usize,
                actual: data.len(),
            });
        }
        let source = buf.get_u32_le();
        let mut target = [0u8; 8];
        buf.copy_to_slice(&mut target);
        buf.advance(6);
        let flags = buf.get_u8();
        let sequence = buf.get_u8();
        buf.advance(8);
        let message_type = buf.get_u16_le();

        Ok(Header {
            size,
            tagged: protocol & TAGGED_BIT != 0,
            source,
            target,
            res_required: flags & RES_REQUIRED_BIT != 0,
            ack_required: flags & ACK_REQUIRED_BIT != 0,
            sequence,
            message_type,
        })
    }

    pub fn serial(&self) -> Serial {
        Serial::from_target(&self.target)
    }
}

/// A header and its decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub message: Message,
}

impl Packet {
    /// Builds a packet for `target`, or a tagged broadcast when `target` is `None`.
    pub fn new(source: u32, target: Option<Serial>, message: Message) -> Self {
        Packet {
            header: Header {
                size: 0,
                tagged: target.is_none(),
                source,
                target: target.map(|serial| serial.target()).unwrap_or_default(),
                res_required: false,
                ack_required: false,
                sequence: 0,
                message_type: message.message_type(),
            },
            message,
        }
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.header.sequence = sequence;
        self
    }

    pub fn with_ack_required(mut self, ack_required: bool) -> Self {
        self.header.ack_required = ack_required;
        self
    }

    pub fn with_res_required(mut self, res_required: bool) -> Self {
        self.header.res_required = res_required;
        self
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut payload = BytesMut::new();
        self.message.encode_payload(&mut payload)?;
        let total = HEADER_SIZE + payload.len();
        let size = u16::try_from(total).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;

        let mut buf = BytesMut::with_capacity(total);
        Header {
            size,
            message_type: self.message.message_type(),
            ..self.header
        }
        .encode(&mut buf);
        buf.extend_from_slice(&payload);
        Ok(buf.freeze())
    }

    /// Splits a datagram into its header and the payload bytes it declares.
    pub fn split(data: &[u8]) -> Result<(Header, &[u8]), CodecError> {
        let header = Header::decode(data)?;
        Ok((header, &data[HEADER_SIZE..header.size as usize]))
    }

    pub fn decode(data: &[u8]) -> Result<Packet, CodecError> {
        let (header, payload) = Packet::split(data)?;
        let message = Message::decode(header.message_type, payload)?;
        Ok(Packet { header, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Hsbk;

    #[test]
    fn test_get_service_bytes() {
        let packet = Packet::new(0x1234_5678, None, Message::GetService)
            .with_res_required(true)
            .with_sequence(7);
        let bytes = packet.encode().unwrap();
        let expected: [u8; 36] = [
            0x24, 0x00, // size 36
            0x00, 0x34, // protocol 1024 | addressable | tagged
            0x78, 0x56, 0x34, 0x12, // source
            0, 0, 0, 0, 0, 0, 0, 0, // target
            0, 0, 0, 0, 0, 0, // reserved
            0x01, 0x07, // res_required, sequence
            0, 0, 0, 0, 0, 0, 0, 0, // reserved
            0x02, 0x00, // GetService
            0x00, 0x00,
        ];
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_unicast_header_flags() {
        let serial: Serial = "d0:73:d5:01:02:03".parse().unwrap();
        let packet = Packet::new(
            42,
            Some(serial),
            Message::SetPower { level: 65535 },
        )
        .with_ack_required(true);
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), 38);
        assert_eq!(&bytes[0..2], &[38, 0]);
        assert_eq!(&bytes[2..4], &[0x00, 0x14]);
        assert_eq!(&bytes[8..16], &[0xd0, 0x73, 0xd5, 0x01, 0x02, 0x03, 0, 0]);
        assert_eq!(bytes[22], 0x02);
        assert_eq!(&bytes[32..34], &[21, 0]);
        assert_eq!(&bytes[36..38], &[0xff, 0xff]);

        let decoded = Packet::decode(&bytes).unwrap();
        assert!(!decoded.header.tagged);
        assert!(decoded.header.ack_required);
        assert!(!decoded.header.res_required);
        assert_eq!(decoded.header.serial(), serial);
        assert_eq!(decoded.message, packet.message);
    }

    #[test]
    fn test_round_trip_boundaries() {
        let serial: Serial = "d0:73:d5:aa:bb:cc".parse().unwrap();
        let messages = vec![
            Message::SetColor {
                color: Hsbk::new(0, 0, 0, 1500),
                duration: 0,
            },
            Message::SetColor {
                color: Hsbk::new(65535, 65535, 65535, 9000),
                duration: u32::MAX,
            },
            Message::SetLabel {
                label: "x".repeat(32),
            },
            Message::StateLabel {
                label: String::new(),
            },
        ];
        for message in messages {
            let packet = Packet::new(u32::MAX, Some(serial), message)
                .with_sequence(255)
                .with_res_required(true);
            let bytes = packet.encode().unwrap();
            let decoded = Packet::decode(&bytes).unwrap();
            assert_eq!(decoded.message, packet.message);
            assert_eq!(decoded.header.source, u32::MAX);
            assert_eq!(decoded.header.sequence, 255);
            assert_eq!(decoded.encode().unwrap(), bytes);
        }
    }

    #[test]
    fn test_rejects_short_buffers() {
        assert_eq!(Header::decode(&[]), Err(CodecError::TooShort(0)));
        assert_eq!(Header::decode(&[0u8; 35]), Err(CodecError::TooShort(35)));
    }

    #[test]
    fn test_rejects_wrong_protocol() {
        let mut bytes = Packet::new(5, None, Message::GetService)
            .encode()
            .unwrap()
            .to_vec();
        bytes[2] = 0x01;
        bytes[3] = 0x14;
        assert_eq!(
            Packet::decode(&bytes),
            Err(CodecError::WrongProtocol(0x401))
        );
    }

    #[test]
    fn test_rejects_size_beyond_datagram() {
        let mut bytes = Packet::new(5, None, Message::GetService)
            .encode()
            .unwrap()
            .to_vec();
        bytes[0] = 40;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(CodecError::BadSize { declared: 40, .. })
        ));
    }

    #[test]
    fn test_garbage_never_panics() {
        for len in 0..80 {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
            let _ = Packet::decode(&data);
        }
        let mut truncated = Packet::new(
            1,
            None,
            Message::SetColor {
                color: Hsbk::BLACK,
                duration: 0,
            },
        )
        .encode()
        .unwrap()
        .to_vec();
        truncated.truncate(40);
        truncated[0] = 40;
        assert!(matches!(
            Packet::decode(&truncated),
            Err(CodecError::Truncated { .. })
        ));
    }
}
