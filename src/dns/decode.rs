//! Wire-format decoding.
//!
//! Parses the header, then exactly as many questions and records as the
//! header counts claim; running out of bytes first is an error. Name
//! decompression enforces the compression-pointer rules: pointers only
//! point backward, jump targets strictly decrease, and the decompressed
//! name stays within 255 octets.

use super::encode::write_name;
use super::{DecodeError, Flags, HEADER_LEN, Message, Question, Record, rtype};

impl Message {
    /// Parse a DNS message from raw bytes. Trailing bytes beyond the
    /// last counted record are ignored.
    pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::ShortHeader);
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = Flags::from_bits(u16::from_be_bytes([data[2], data[3]]));
        let qdcount = u16::from_be_bytes([data[4], data[5]]);
        let ancount = u16::from_be_bytes([data[6], data[7]]);
        let nscount = u16::from_be_bytes([data[8], data[9]]);
        let arcount = u16::from_be_bytes([data[10], data[11]]);

        let mut reader = Reader {
            data,
            pos: HEADER_LEN,
        };

        let mut questions = Vec::with_capacity(qdcount as usize);
        for _ in 0..qdcount {
            let name = reader.read_name()?;
            let qtype = reader.read_u16()?;
            let qclass = reader.read_u16()?;
            questions.push(Question {
                name,
                qtype,
                qclass,
            });
        }

        let answers = reader.read_records(ancount)?;
        let authority = reader.read_records(nscount)?;
        let additional = reader.read_records(arcount)?;

        Ok(Message {
            id,
            flags,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

/// Cursor over a raw message. Name reads may jump backward through
/// compression pointers; the cursor always resumes after the pointer.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    /// Read a (possibly compressed) domain name at the cursor.
    ///
    /// Each pointer must target an offset lower than both its own
    /// position and every previous jump target, so the walk terminates
    /// and loops are rejected.
    fn read_name(&mut self) -> Result<String, DecodeError> {
        let data = self.data;
        let mut labels: Vec<&'a str> = Vec::new();
        let mut encoded_len = 1usize; // terminating root octet
        let mut pos = self.pos;
        let mut resume = None;
        let mut jump_floor = usize::MAX;

        loop {
            let len = *data.get(pos).ok_or(DecodeError::UnexpectedEof)? as usize;
            match len & 0xC0 {
                0xC0 => {
                    let lo = *data.get(pos + 1).ok_or(DecodeError::UnexpectedEof)?;
                    let target = ((len & 0x3F) << 8) | lo as usize;
                    if target >= pos || target >= jump_floor {
                        return Err(DecodeError::MalformedName);
                    }
                    if resume.is_none() {
                        resume = Some(pos + 2);
                    }
                    jump_floor = target;
                    pos = target;
                }
                0x00 => {
                    if len == 0 {
                        pos += 1;
                        break;
                    }
                    encoded_len += 1 + len;
                    if encoded_len > 255 {
                        return Err(DecodeError::MalformedName);
                    }
                    let bytes = data
                        .get(pos + 1..pos + 1 + len)
                        .ok_or(DecodeError::UnexpectedEof)?;
                    let label =
                        std::str::from_utf8(bytes).map_err(|_| DecodeError::MalformedName)?;
                    labels.push(label);
                    pos += 1 + len;
                }
                // 0x40 and 0x80 are reserved label types.
                _ => return Err(DecodeError::MalformedName),
            }
        }

        self.pos = resume.unwrap_or(pos);
        Ok(labels.join("."))
    }

    fn read_records(&mut self, count: u16) -> Result<Vec<Record>, DecodeError> {
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(self.read_record()?);
        }
        Ok(records)
    }

    fn read_record(&mut self) -> Result<Record, DecodeError> {
        let name = self.read_name()?;
        let rtype = self.read_u16()?;
        let class = self.read_u16()?;
        let ttl = self.read_u32()?;
        let rdlen = self.read_u16()? as usize;
        let rdata_start = self.pos;
        let raw = self.take(rdlen)?;
        let rdata = self.canonical_rdata(rtype, rdata_start, raw)?;

        Ok(Record {
            name,
            rtype,
            class,
            ttl,
            rdata,
        })
    }

    /// Rewrite rdata that embeds domain names into uncompressed form so
    /// the record can be re-encoded at a different offset. All other
    /// types are copied verbatim.
    fn canonical_rdata(
        &self,
        rtype_: u16,
        start: usize,
        raw: &[u8],
    ) -> Result<Vec<u8>, DecodeError> {
        let end = start + raw.len();
        let mut sub = Reader {
            data: self.data,
            pos: start,
        };

        match rtype_ {
            rtype::CNAME | rtype::NS | rtype::PTR => {
                let name = sub.read_name()?;
                if sub.pos > end {
                    return Err(DecodeError::UnexpectedEof);
                }
                let mut out = Vec::with_capacity(name.len() + 2);
                write_name(&mut out, &name);
                Ok(out)
            }
            rtype::MX => {
                let preference = sub.read_u16()?;
                let name = sub.read_name()?;
                if sub.pos > end {
                    return Err(DecodeError::UnexpectedEof);
                }
                let mut out = Vec::with_capacity(name.len() + 4);
                out.extend_from_slice(&preference.to_be_bytes());
                write_name(&mut out, &name);
                Ok(out)
            }
            rtype::SOA => {
                let mname = sub.read_name()?;
                let rname = sub.read_name()?;
                if sub.pos + 20 > end {
                    return Err(DecodeError::UnexpectedEof);
                }
                let fixed = sub.take(20)?;
                let mut out = Vec::with_capacity(mname.len() + rname.len() + 24);
                write_name(&mut out, &mname);
                write_name(&mut out, &rname);
                out.extend_from_slice(fixed);
                Ok(out)
            }
            _ => Ok(raw.to_vec()),
        }
    }
}
