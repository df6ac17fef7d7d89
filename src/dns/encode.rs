//! Wire-format encoding.
//!
//! Sections are written in header order: questions, answers, authority,
//! additional. A record whose name repeats the first question's is
//! emitted as a pointer to offset 12, which keeps synthesized responses
//! compact without a full compression dictionary.

use super::{HEADER_LEN, Message, Record};

impl Message {
    /// Serialize to wire format with no size bound. TCP framing adds
    /// its length prefix separately.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_bits().to_be_bytes());
        data.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.authority.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.additional.len() as u16).to_be_bytes());

        for q in &self.questions {
            write_name(&mut data, &q.name);
            data.extend_from_slice(&q.qtype.to_be_bytes());
            data.extend_from_slice(&q.qclass.to_be_bytes());
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            self.write_record(&mut data, record);
        }

        data
    }

    /// Serialize for a transport that cannot carry more than `limit`
    /// octets. When the full encoding does not fit, the TC flag is set,
    /// authority and additional are dropped, and only as many answer
    /// records as fit are kept; the client retries over TCP.
    pub fn encode_bounded(&self, limit: usize) -> Vec<u8> {
        let full = self.encode();
        if full.len() <= limit {
            return full;
        }

        let mut truncated = self.clone();
        truncated.flags.truncated = true;
        truncated.authority.clear();
        truncated.additional.clear();
        loop {
            let data = truncated.encode();
            if data.len() <= limit || truncated.answers.is_empty() {
                return data;
            }
            truncated.answers.pop();
        }
    }

    fn write_record(&self, data: &mut Vec<u8>, record: &Record) {
        if self.questions.first().is_some_and(|q| q.name == record.name) {
            data.extend_from_slice(&[0xC0, HEADER_LEN as u8]);
        } else {
            write_name(data, &record.name);
        }
        data.extend_from_slice(&record.rtype.to_be_bytes());
        data.extend_from_slice(&record.class.to_be_bytes());
        data.extend_from_slice(&record.ttl.to_be_bytes());
        data.extend_from_slice(&(record.rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(&record.rdata);
    }
}

/// Append a name in uncompressed label format. The root name is a
/// single zero octet.
pub(super) fn write_name(data: &mut Vec<u8>, name: &str) {
    if !name.is_empty() {
        for label in name.split('.') {
            data.push(label.len() as u8);
            data.extend_from_slice(label.as_bytes());
        }
    }
    data.push(0);
}

#[cfg(test)]
mod tests {
    use super::super::{Flags, Message, Question, Record, class, rcode, rtype};
    use super::write_name;
    use std::net::Ipv4Addr;

    fn question(name: &str) -> Question {
        Question {
            name: name.to_string(),
            qtype: rtype::A,
            qclass: class::IN,
        }
    }

    #[test]
    fn round_trip_query() {
        let query = Message::query(0x1234, question("example.com"));

        assert_eq!(Message::decode(&query.encode()).unwrap(), query);
    }

    #[test]
    fn round_trip_full_response() {
        let query = Message::query(0xBEEF, question("example.com"));
        let mut response = Message::response_to(&query);
        response.flags.rcode = rcode::NOERROR;
        response
            .answers
            .push(Record::a("example.com", Ipv4Addr::new(93, 184, 216, 34), 300));

        let mut cname_rdata = Vec::new();
        write_name(&mut cname_rdata, "origin.example.net");
        response.answers.push(Record {
            name: "www.example.com".to_string(),
            rtype: rtype::CNAME,
            class: class::IN,
            ttl: 60,
            rdata: cname_rdata,
        });

        let mut ns_rdata = Vec::new();
        write_name(&mut ns_rdata, "ns1.example.com");
        response.authority.push(Record {
            name: "example.com".to_string(),
            rtype: rtype::NS,
            class: class::IN,
            ttl: 3600,
            rdata: ns_rdata,
        });

        response.additional.push(Record {
            name: String::new(),
            rtype: rtype::OPT,
            class: 1232,
            ttl: 0,
            rdata: Vec::new(),
        });

        assert_eq!(Message::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn repeated_name_uses_pointer_to_question() {
        let query = Message::query(1, question("example.com"));
        let mut response = Message::response_to(&query);
        response
            .answers
            .push(Record::a("example.com", Ipv4Addr::new(0, 0, 0, 0), 300));

        let data = response.encode();
        // Answer name starts right after the question section.
        let answer_start = 12 + 13 + 4;
        assert_eq!(&data[answer_start..answer_start + 2], &[0xC0, 0x0C]);
    }

    #[test]
    fn root_name_is_single_zero_octet() {
        let mut data = Vec::new();
        write_name(&mut data, "");

        assert_eq!(data, vec![0]);
    }

    #[test]
    fn oversized_response_is_truncated_with_tc() {
        let query = Message::query(7, question("big.example.com"));
        let mut response = Message::response_to(&query);
        for i in 0..60 {
            response.answers.push(Record::a(
                "big.example.com",
                Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8),
                300,
            ));
        }
        response.authority.push(Record {
            name: "example.com".to_string(),
            rtype: rtype::NS,
            class: class::IN,
            ttl: 3600,
            rdata: vec![0],
        });
        assert!(response.encode().len() > 512);

        let bounded = response.encode_bounded(512);
        assert!(bounded.len() <= 512);

        let decoded = Message::decode(&bounded).unwrap();
        assert!(decoded.flags.truncated);
        assert!(decoded.answers.len() < 60);
        assert!(!decoded.answers.is_empty());
        assert!(decoded.authority.is_empty());
        assert_eq!(decoded.questions, response.questions);
    }

    #[test]
    fn fitting_response_is_untouched_by_bound() {
        let query = Message::query(7, question("example.com"));
        let mut response = Message::response_to(&query);
        response
            .answers
            .push(Record::a("example.com", Ipv4Addr::new(1, 2, 3, 4), 300));

        let bounded = response.encode_bounded(512);

        assert_eq!(bounded, response.encode());
        assert!(!Message::decode(&bounded).unwrap().flags.truncated);
    }

    #[test]
    fn error_response_encodes_without_question() {
        let response = Message::error_response(0x4242, rcode::FORMERR);

        let decoded = Message::decode(&response.encode()).unwrap();

        assert_eq!(decoded.id, 0x4242);
        assert_eq!(decoded.flags.rcode, rcode::FORMERR);
        assert!(decoded.flags.response);
        assert!(decoded.questions.is_empty());
    }

    #[test]
    fn flags_survive_encoding() {
        let mut message = Message::query(9, question("example.com"));
        message.flags = Flags {
            response: true,
            opcode: 0,
            authoritative: true,
            truncated: false,
            recursion_desired: true,
            recursion_available: true,
            rcode: rcode::SERVFAIL,
        };

        assert_eq!(
            Message::decode(&message.encode()).unwrap().flags,
            message.flags
        );
    }
}
