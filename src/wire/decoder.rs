use std::{error, fmt, io};

use bytes::{Buf, Bytes};
use tokio_util::codec;

use super::admin;
use super::events::GearmanEvent;
use super::protocol::{Command, CommandId, Priority, Response};

const HEADER_LEN: usize = 12;
const MAX_TEXT_LINE: usize = 8192;
/// Hard ceiling on a single frame's body, independent of the per-job payload
/// cap enforced by the registry (`--max-job-size`); this only guards against
/// a corrupt/hostile length field pinning the connection's buffer forever.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Magic {
    Request,
    Response,
}

/// A decoder for a stream of Gearman protocol packets: the binary framing of
/// spec §4.1, or (per-packet) the text admin dialect.
#[derive(Debug, Default)]
pub enum Decoder {
    #[default]
    ParseHeader,
    ParseBody {
        magic: Magic,
        command: CommandId,
        body_len: usize,
    },
}

impl codec::Decoder for Decoder {
    type Item = GearmanEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match *self {
                Decoder::ParseHeader => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    if src[0] != 0 {
                        return self.decode_text_line(src);
                    }

                    if src.len() < HEADER_LEN {
                        return Ok(None);
                    }

                    let magic = match &src[0..4] {
                        b"\0REQ" => Magic::Request,
                        b"\0RES" => Magic::Response,
                        _ => {
                            src.advance(4);
                            return Err(Response::error("invalid_magic", "invalid magic value").into());
                        },
                    };

                    let cmd_id = u32::from_be_bytes([src[4], src[5], src[6], src[7]]);
                    let command = match CommandId::from_u32(cmd_id) {
                        Some(c) => c,
                        None => {
                            src.advance(HEADER_LEN);
                            return Err(
                                Response::error("invalid_command", "invalid command value").into()
                            );
                        },
                    };

                    let body_len = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
                    if body_len > MAX_BODY_LEN {
                        src.advance(HEADER_LEN);
                        return Err(
                            Response::error("argument_too_large", "argument too large").into()
                        );
                    }

                    src.advance(HEADER_LEN);
                    src.reserve(body_len.min(16_384));
                    *self = Decoder::ParseBody { magic, command, body_len };
                },
                Decoder::ParseBody { magic, command, body_len } => {
                    if src.len() < body_len {
                        return Ok(None);
                    }

                    let body = src.split_to(body_len).freeze();
                    *self = Decoder::ParseHeader;

                    // Responses arriving on a server socket are not
                    // meaningful; the original implementation accepts only
                    // requests from clients/workers. Treat a RES frame the
                    // same as a REQ frame rather than rejecting it outright,
                    // since the magic only distinguishes direction.
                    let _ = magic;

                    return match decode_command(command, body) {
                        Ok(cmd) => Ok(Some(GearmanEvent::Command(cmd))),
                        Err(e) => Err(e),
                    };
                },
            }
        }
    }
}

impl Decoder {
    fn decode_text_line(
        &mut self,
        src: &mut bytes::BytesMut,
    ) -> Result<Option<GearmanEvent>, Error> {
        let nl = src.iter().position(|&b| b == b'\n');

        let Some(idx) = nl else {
            if src.len() >= MAX_TEXT_LINE {
                src.advance(src.len());
                return Err(Response::error("invalid_command", "line too long").into());
            }
            return Ok(None);
        };

        let mut line = src.split_to(idx + 1);
        line.truncate(line.len() - 1); // drop \n
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        match admin::parse_admin_line(&line) {
            Ok(cmd) => Ok(Some(GearmanEvent::Admin(cmd))),
            Err(_) => Err(Response::error("unknown_command", "unknown command").into()),
        }
    }
}

/// Splits `body` on NUL bytes into exactly `n` arguments; the final argument
/// is whatever remains after the (n-1)th separator and may itself contain
/// NUL bytes (the "data" argument for bulk-carrying commands).
fn split_args(body: &Bytes, n: usize) -> Result<Vec<Bytes>, Error> {
    let mut args = Vec::with_capacity(n);
    let mut rest = body.clone();

    for _ in 0..n.saturating_sub(1) {
        let pos = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::from(Response::error("invalid_packet", "missing argument"))
        })?;
        args.push(rest.split_to(pos));
        rest.advance(1); // skip the NUL
    }
    args.push(rest);

    Ok(args)
}

fn as_u32(b: &Bytes) -> Result<u32, Error> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::from(Response::error("invalid_packet", "expected a number")))
}

fn as_i64(b: &Bytes) -> Result<i64, Error> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::from(Response::error("invalid_packet", "expected a number")))
}

/// `SUBMIT_REDUCE_JOB`'s fourth argument carries either a decimal epoch
/// timestamp or a literal priority keyword, never both.
fn reduce_priority_or_epoch(b: &Bytes) -> Result<(Priority, Option<i64>), Error> {
    Ok(match b.as_ref() {
        b"HIGH" => (Priority::High, None),
        b"NORMAL" | b"" => (Priority::Normal, None),
        b"LOW" => (Priority::Low, None),
        _ => (Priority::Normal, Some(as_i64(b)?)),
    })
}

fn decode_command(command: CommandId, body: Bytes) -> Result<Command, Error> {
    use CommandId::*;

    Ok(match command {
        CanDo => {
            let [function] = split_args(&body, 1)?.try_into().unwrap();
            Command::CanDo { function }
        },
        CanDoTimeout => {
            let a = split_args(&body, 2)?;
            Command::CanDoTimeout { function: a[0].clone(), timeout: as_u32(&a[1])? }
        },
        CantDo => {
            let [function] = split_args(&body, 1)?.try_into().unwrap();
            Command::CantDo { function }
        },
        ResetAbilities => Command::ResetAbilities,
        PreSleep => Command::PreSleep,
        SubmitJob | SubmitJobHigh | SubmitJobLow | SubmitJobBg | SubmitJobHighBg
        | SubmitJobLowBg => {
            let a = split_args(&body, 3)?;
            let (priority, background) = submit_kind(command);
            Command::SubmitJob {
                function: a[0].clone(),
                unique: a[1].clone(),
                data: a[2].clone(),
                priority,
                background,
                epoch: None,
            }
        },
        SubmitJobEpoch => {
            let a = split_args(&body, 4)?;
            Command::SubmitJob {
                function: a[0].clone(),
                unique: a[1].clone(),
                data: a[3].clone(),
                priority: Priority::Normal,
                background: true,
                epoch: Some(as_i64(&a[2])?),
            }
        },
        SubmitReduceJob | SubmitReduceJobBackground => {
            let a = split_args(&body, 5)?;
            let (priority, epoch) = reduce_priority_or_epoch(&a[3])?;
            Command::SubmitReduceJob {
                function: a[0].clone(),
                unique: a[1].clone(),
                reducer: a[2].clone(),
                priority,
                epoch,
                data: a[4].clone(),
                background: matches!(command, SubmitReduceJobBackground),
            }
        },
        GrabJob => Command::GrabJob,
        GrabJobUniq => Command::GrabJobUniq,
        GrabJobAll => Command::GrabJobAll,
        WorkData => {
            let a = split_args(&body, 2)?;
            Command::WorkData { handle: a[0].clone(), data: a[1].clone() }
        },
        WorkWarning => {
            let a = split_args(&body, 2)?;
            Command::WorkWarning { handle: a[0].clone(), data: a[1].clone() }
        },
        WorkStatus => {
            let a = split_args(&body, 3)?;
            Command::WorkStatus {
                handle: a[0].clone(),
                numerator: as_u32(&a[1])?,
                denominator: as_u32(&a[2])?,
            }
        },
        WorkComplete => {
            let a = split_args(&body, 2)?;
            Command::WorkComplete { handle: a[0].clone(), data: a[1].clone() }
        },
        WorkFail => {
            let [handle] = split_args(&body, 1)?.try_into().unwrap();
            Command::WorkFail { handle }
        },
        WorkException => {
            let a = split_args(&body, 2)?;
            Command::WorkException { handle: a[0].clone(), data: a[1].clone() }
        },
        GetStatus => {
            let [handle] = split_args(&body, 1)?.try_into().unwrap();
            Command::GetStatus { handle }
        },
        GetStatusUnique => {
            let [unique] = split_args(&body, 1)?.try_into().unwrap();
            Command::GetStatusUnique { unique }
        },
        EchoReq => Command::EchoReq { data: body },
        OptionReq => {
            let [option] = split_args(&body, 1)?.try_into().unwrap();
            Command::OptionReq { option }
        },
        SetClientId => {
            let [id] = split_args(&body, 1)?.try_into().unwrap();
            Command::SetClientId { id }
        },
        AllYours => Command::AllYours,
        // The remaining ids (JobCreated, NoJob, JobAssign*, EchoRes, Error,
        // StatusRes*, Noop, OptionRes) are server->client responses and never
        // arrive as inbound commands on a well-behaved connection.
        _ => {
            return Err(
                Response::error("invalid_command", "unexpected response-only command").into(),
            )
        },
    })
}

fn submit_kind(command: CommandId) -> (Priority, bool) {
    use CommandId::*;
    match command {
        SubmitJob => (Priority::Normal, false),
        SubmitJobBg => (Priority::Normal, true),
        SubmitJobHigh => (Priority::High, false),
        SubmitJobHighBg => (Priority::High, true),
        SubmitJobLow => (Priority::Low, false),
        SubmitJobLowBg => (Priority::Low, true),
        _ => unreachable!(),
    }
}

#[derive(Debug)]
pub enum Error {
    Client(Response),
    IO(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<Response> for Error {
    fn from(value: Response) -> Self {
        Self::Client(value)
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::IO(value)
    }
}
