//! SMS collaborator seam
//!
//! PDU encoding and decoding live outside this crate. The driver hands
//! every inbound PDU to an [`SmsCodec`] and attaches whatever comes
//! back; hosts that work on raw PDUs plug in [`RawPduCodec`].

use crate::error::ModemError;

/// Decoded form of an inbound SMS, as much of it as the codec produced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SmsMessage {
    /// Sender address in printable form
    pub originating_address: Option<String>,
    /// Message body text
    pub text: Option<String>,
    /// Service centre timestamp, printable form
    pub timestamp: Option<String>,
}

/// PDU codec plugged into the driver
pub trait SmsCodec: Send + Sync {
    /// Decode an SMS-DELIVER PDU. `None` means the host gets the raw
    /// PDU only.
    fn decode_deliver(&self, pdu: &str) -> Option<SmsMessage>;
}

/// Codec that decodes nothing; hosts see raw PDUs
#[derive(Debug, Default)]
pub struct RawPduCodec;

impl SmsCodec for RawPduCodec {
    fn decode_deliver(&self, _pdu: &str) -> Option<SmsMessage> {
        None
    }
}

/// Encode a service centre address the way `AT+CMGS` wants it prefixed
/// to the PDU: length octet, type-of-address, then the number in
/// nibble-swapped BCD padded with `F`.
pub fn encode_smsc(number: &str, address_type: u8) -> String {
    let digits: Vec<u8> = number
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();

    let mut octets = vec![address_type];
    for pair in digits.chunks(2) {
        let low = pair[0];
        let high = if pair.len() == 2 { pair[1] } else { 0x0f };
        octets.push((high << 4) | low);
    }

    let mut out = format!("{:02X}", octets.len());
    for octet in octets {
        out.push_str(&format!("{octet:02X}"));
    }
    out
}

/// Pull the number and type-of-address out of a `+CSCA:` report line
/// body, e.g. `"+31624000000",145`.
pub fn parse_csca(line: &str) -> Option<(String, u8)> {
    let mut fields = hayes_protocol::Tokenizer::new(line).ok()?;
    let number = fields.next_str().ok()?.to_owned();
    let toa = fields.next_int().unwrap_or(145) as u8;
    Some((number, toa))
}

impl crate::driver::ModemDriver {
    /// Send an SMS-SUBMIT PDU, returning the message reference the
    /// network assigned.
    ///
    /// `smsc` is the service centre address as already-encoded hex
    /// octets; with `None` the modem's configured centre is queried and
    /// encoded here. The PDU length announced to the modem excludes the
    /// centre, per 27.005.
    pub async fn send_sms(&self, smsc: Option<&str>, pdu: &str) -> Result<i64, ModemError> {
        let smsc_hex = match smsc {
            Some(encoded) => encoded.to_owned(),
            None => {
                let response = self.channel.send_singleline("AT+CSCA?", "+CSCA:").await?;
                if !response.success {
                    return Err(ModemError::Command(response.final_line));
                }
                let line = crate::driver::first_line(&response)?;
                let (number, toa) = parse_csca(line).ok_or_else(|| {
                    ModemError::InvalidResponse(format!("bad service centre report: {line}"))
                })?;
                encode_smsc(&number, toa)
            }
        };

        let command = format!("AT+CMGS={}", pdu.len() / 2);
        let payload = format!("{smsc_hex}{pdu}");
        let response = self.channel.send_sms(&command, &payload, "+CMGS:").await?;
        if !response.success {
            return Err(ModemError::Command(response.final_line));
        }
        let mut fields = hayes_protocol::Tokenizer::new(crate::driver::first_line(&response)?)?;
        Ok(fields.next_int()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smsc_encoding_swaps_nibbles() {
        // +31 62 400 0000, international (0x91)
        assert_eq!(encode_smsc("+31624000000", 0x91), "07911326040000F0");
    }

    #[test]
    fn smsc_encoding_even_digit_count() {
        assert_eq!(encode_smsc("3162400000", 0x91), "069113264000");
    }

    #[test]
    fn csca_report_parses() {
        let (number, toa) = parse_csca("+CSCA: \"+31624000000\",145").unwrap();
        assert_eq!(number, "+31624000000");
        assert_eq!(toa, 145);
    }

    #[test]
    fn csca_report_without_type_defaults_international() {
        let (_, toa) = parse_csca("+CSCA: \"+31624000000\"").unwrap();
        assert_eq!(toa, 145);
    }
}
