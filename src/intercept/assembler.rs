//! Query buffer assembly: holds back one statement until it is complete.
//!
//! Only Query and Parse units are assembled. Everything else is handed back
//! as soon as it is framed. When the statement is bounded (rewrite enabled)
//! and its frame is larger than the buffer capacity, the overflow is reported
//! once and the frame is then streamed out in fragments as its bytes arrive,
//! never held whole.

use bytes::BytesMut;
use std::ops::Range;

use crate::wire::{
    FrameError, FrameHeader, MessageFramer, MessageType, ProtocolUnit,
    observers::{ParseFrameObserver, QueryFrameObserver},
};

// -----------------------------------------------------------------------------
// ----- AssemblyState ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    Accumulating {
        kind: MessageType,
        expected: usize,
        received: usize,
    },
    /// A statement has been handed out and not yet completed.
    Ready,
    Overflowed {
        kind: MessageType,
        expected: usize,
        remaining: usize,
    },
}

// -----------------------------------------------------------------------------
// ----- Step ------------------------------------------------------------------

#[derive(Debug)]
pub enum Step {
    NeedMore,
    Bypass(ProtocolUnit),
    Ready(Statement),
    Overflowed(FrameHeader),
    /// Raw bytes of an overflowed frame. `first` marks the fragment that
    /// starts with the frame's tag.
    Fragment { bytes: BytesMut, first: bool },
}

// -----------------------------------------------------------------------------
// ----- Statement -------------------------------------------------------------

/// A complete Query or Parse unit plus the location of its text.
#[derive(Debug, Clone)]
pub struct Statement {
    pub(super) unit: ProtocolUnit,
    // None when the body is malformed or not UTF-8; such units are forwarded
    // without a decision.
    pub(super) text: Option<Range<usize>>,
}

impl Statement {
    pub fn from_unit(unit: ProtocolUnit) -> Self {
        let text = match unit.message_type() {
            MessageType::Query => QueryFrameObserver::new(unit.as_bytes())
                .ok()
                .map(|obs| obs.query_span()),
            MessageType::Parse => ParseFrameObserver::new(unit.as_bytes())
                .ok()
                .map(|obs| obs.query_span()),
            _ => None,
        };

        Self { unit, text }
    }

    #[inline]
    pub fn kind(&self) -> MessageType {
        self.unit.message_type()
    }

    pub fn text(&self) -> Option<&str> {
        let span = self.text.clone()?;
        std::str::from_utf8(&self.unit.as_bytes()[span]).ok()
    }

    #[inline]
    pub fn unit(&self) -> &ProtocolUnit {
        &self.unit
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.unit.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.unit.is_empty()
    }

    pub fn into_unit(self) -> ProtocolUnit {
        self.unit
    }
}

// -----------------------------------------------------------------------------
// ----- QueryAssembler --------------------------------------------------------

#[derive(Debug)]
pub struct QueryAssembler {
    state: AssemblyState,
    // None: statements are unbounded (rewrite disabled).
    capacity: Option<usize>,
}

// -----------------------------------------------------------------------------
// ----- QueryAssembler: Static ------------------------------------------------

impl QueryAssembler {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: AssemblyState::Idle,
            capacity,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- QueryAssembler: Public ------------------------------------------------

impl QueryAssembler {
    #[inline]
    pub fn state(&self) -> AssemblyState {
        self.state
    }

    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Consume what the framer holds and report the next step.
    ///
    /// After `Step::Ready` the caller must forward or discard the statement
    /// and call [`QueryAssembler::complete`] before advancing again.
    pub fn advance(&mut self, framer: &mut MessageFramer) -> Result<Step, FrameError> {
        debug_assert!(
            self.state != AssemblyState::Ready,
            "advance() called before complete()"
        );

        if let AssemblyState::Overflowed {
            kind,
            expected,
            remaining,
        } = self.state
        {
            let bytes = framer.take_up_to(remaining);
            if bytes.is_empty() {
                return Ok(Step::NeedMore);
            }

            let left = remaining - bytes.len();
            self.state = if left == 0 {
                AssemblyState::Idle
            } else {
                AssemblyState::Overflowed {
                    kind,
                    expected,
                    remaining: left,
                }
            };
            return Ok(Step::Fragment {
                bytes,
                first: remaining == expected,
            });
        }

        let Some(header) = framer.peek_header()? else {
            return Ok(Step::NeedMore);
        };

        let kind = header.message_type;
        if !kind.is_statement() {
            return Ok(match framer.next_unit()? {
                Some(unit) => Step::Bypass(unit),
                None => Step::NeedMore,
            });
        }

        if let Some(capacity) = self.capacity {
            if header.total_len > capacity {
                self.state = AssemblyState::Overflowed {
                    kind,
                    expected: header.total_len,
                    remaining: header.total_len,
                };
                return Ok(Step::Overflowed(header));
            }
        }

        match framer.next_unit()? {
            Some(unit) => {
                self.state = AssemblyState::Ready;
                Ok(Step::Ready(Statement::from_unit(unit)))
            }
            None => {
                self.state = AssemblyState::Accumulating {
                    kind,
                    expected: header.total_len,
                    received: framer.buffered(),
                };
                Ok(Step::NeedMore)
            }
        }
    }

    /// The handed-out statement was forwarded or discarded.
    pub fn complete(&mut self) {
        self.state = AssemblyState::Idle;
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn query_frame(sql: &str) -> Vec<u8> {
        let mut b = BytesMut::new();
        b.put_u8(b'Q');
        b.put_u32((4 + sql.len() + 1) as u32);
        b.extend_from_slice(sql.as_bytes());
        b.put_u8(0);
        b.to_vec()
    }

    fn parse_frame(name: &str, sql: &str, oids: &[i32]) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.extend_from_slice(name.as_bytes());
        body.put_u8(0);
        body.extend_from_slice(sql.as_bytes());
        body.put_u8(0);
        body.put_i16(oids.len() as i16);
        for oid in oids {
            body.put_i32(*oid);
        }

        let mut b = BytesMut::new();
        b.put_u8(b'P');
        b.put_u32((4 + body.len()) as u32);
        b.extend_from_slice(&body);
        b.to_vec()
    }

    #[test]
    fn statement_split_across_reads_is_held_back() {
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(Some(1024));
        let frame = query_frame("SELECT * FROM tableb");

        framer.extend(&frame[..9]);
        assert!(matches!(assembler.advance(&mut framer).unwrap(), Step::NeedMore));
        assert_eq!(
            assembler.state(),
            AssemblyState::Accumulating {
                kind: MessageType::Query,
                expected: frame.len(),
                received: 9,
            }
        );

        framer.extend(&frame[9..]);
        match assembler.advance(&mut framer).unwrap() {
            Step::Ready(statement) => {
                assert_eq!(statement.text(), Some("SELECT * FROM tableb"));
                assert_eq!(statement.unit().as_bytes(), &frame[..]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(assembler.state(), AssemblyState::Ready);

        assembler.complete();
        assert_eq!(assembler.state(), AssemblyState::Idle);
    }

    #[test]
    fn non_statement_units_bypass() {
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(Some(16));
        framer.extend(&[b'S', 0, 0, 0, 4]);

        match assembler.advance(&mut framer).unwrap() {
            Step::Bypass(unit) => assert_eq!(unit.message_type(), MessageType::Sync),
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(assembler.state(), AssemblyState::Idle);
    }

    #[test]
    fn exact_capacity_completes() {
        let frame = query_frame("SELECT 1");
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(Some(frame.len()));
        framer.extend(&frame);

        assert!(matches!(assembler.advance(&mut framer).unwrap(), Step::Ready(_)));
    }

    #[test]
    fn one_byte_over_capacity_overflows_once() {
        let frame = query_frame("SELECT 1");
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(Some(frame.len() - 1));

        framer.extend(&frame[..6]);
        match assembler.advance(&mut framer).unwrap() {
            Step::Overflowed(header) => assert_eq!(header.total_len, frame.len()),
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(matches!(assembler.state(), AssemblyState::Overflowed { .. }));

        // What has arrived goes out at once, without a second report.
        match assembler.advance(&mut framer).unwrap() {
            Step::Fragment { bytes, first } => {
                assert!(first);
                assert_eq!(&bytes[..], &frame[..6]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(matches!(assembler.advance(&mut framer).unwrap(), Step::NeedMore));

        framer.extend(&frame[6..]);
        match assembler.advance(&mut framer).unwrap() {
            Step::Fragment { bytes, first } => {
                assert!(!first);
                assert_eq!(&bytes[..], &frame[6..]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(assembler.state(), AssemblyState::Idle);
    }

    #[test]
    fn overflowed_frame_never_swallows_the_next_unit() {
        let big = query_frame(&"x".repeat(200));
        let sync = [b'S', 0, 0, 0, 4];
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(Some(64));

        framer.extend(&big);
        framer.extend(&sync);

        assert!(matches!(assembler.advance(&mut framer).unwrap(), Step::Overflowed(_)));
        match assembler.advance(&mut framer).unwrap() {
            Step::Fragment { bytes, first } => {
                assert!(first);
                assert_eq!(&bytes[..], &big[..]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
        match assembler.advance(&mut framer).unwrap() {
            Step::Bypass(unit) => assert_eq!(unit.message_type(), MessageType::Sync),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn unbounded_assembler_never_overflows() {
        let frame = query_frame(&"x".repeat(4096));
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(None);
        framer.extend(&frame);

        assert!(matches!(assembler.advance(&mut framer).unwrap(), Step::Ready(_)));
    }

    #[test]
    fn parse_statement_exposes_query_text() {
        let frame = parse_frame("s1", "SELECT $1::int", &[23]);
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(None);
        framer.extend(&frame);

        match assembler.advance(&mut framer).unwrap() {
            Step::Ready(statement) => {
                assert_eq!(statement.kind(), MessageType::Parse);
                assert_eq!(statement.text(), Some("SELECT $1::int"));
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn malformed_statement_has_no_text() {
        // Declared length covers the payload but the terminator is missing.
        let frame = [b'Q', 0, 0, 0, 7, b'a', b'b', b'c'];
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(None);
        framer.extend(&frame);

        match assembler.advance(&mut framer).unwrap() {
            Step::Ready(statement) => assert_eq!(statement.text(), None),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn corrupt_header_is_an_error() {
        let mut framer = MessageFramer::new();
        let mut assembler = QueryAssembler::new(None);
        framer.extend(&[b'Q', 0, 0, 0, 1]);
        assert!(assembler.advance(&mut framer).is_err());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
