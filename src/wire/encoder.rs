use std::{error, fmt, io};

use bytes::BufMut;
use tokio_util::codec;

use super::protocol::{CommandId, Outbound, Response};

/// An encoder producing Gearman protocol response frames (and raw text-admin
/// output, which is unframed).
#[derive(Debug, Default)]
pub struct Encoder {}

impl codec::Encoder<Outbound> for Encoder {
    type Error = Error;

    fn encode(&mut self, item: Outbound, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        match item {
            Outbound::Text(text) => {
                dst.extend_from_slice(&text);
                Ok(())
            },
            Outbound::Binary(resp) => encode_binary(resp, dst),
        }
    }
}

fn put_frame(dst: &mut bytes::BytesMut, id: CommandId, args: &[&[u8]]) {
    let body_len: usize =
        args.iter().map(|a| a.len()).sum::<usize>() + args.len().saturating_sub(1);

    dst.reserve(12 + body_len);
    dst.put_slice(b"\0RES");
    dst.put_u32(id as u32);
    dst.put_u32(body_len as u32);

    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            dst.put_u8(0);
        }
        dst.put_slice(arg);
    }
}

fn encode_binary(item: Response, dst: &mut bytes::BytesMut) -> Result<(), Error> {
    use Response::*;

    match item {
        Noop => put_frame(dst, CommandId::Noop, &[]),
        JobCreated { handle } => put_frame(dst, CommandId::JobCreated, &[&handle]),
        NoJob => put_frame(dst, CommandId::NoJob, &[]),
        JobAssign { handle, function, data } => {
            put_frame(dst, CommandId::JobAssign, &[&handle, &function, &data])
        },
        JobAssignUniq { handle, function, unique, data } => {
            put_frame(dst, CommandId::JobAssignUniq, &[&handle, &function, &unique, &data])
        },
        JobAssignAll { handle, function, unique, reducer, data } => put_frame(
            dst,
            CommandId::JobAssignAll,
            &[&handle, &function, &unique, &reducer, &data],
        ),
        WorkData { handle, data } => put_frame(dst, CommandId::WorkData, &[&handle, &data]),
        WorkWarning { handle, data } => put_frame(dst, CommandId::WorkWarning, &[&handle, &data]),
        WorkStatus { handle, numerator, denominator } => put_frame(
            dst,
            CommandId::WorkStatus,
            &[&handle, numerator.to_string().as_bytes(), denominator.to_string().as_bytes()],
        ),
        WorkComplete { handle, data } => {
            put_frame(dst, CommandId::WorkComplete, &[&handle, &data])
        },
        WorkFail { handle } => put_frame(dst, CommandId::WorkFail, &[&handle]),
        WorkException { handle, data } => {
            put_frame(dst, CommandId::WorkException, &[&handle, &data])
        },
        StatusRes { handle, known, running, numerator, denominator } => put_frame(
            dst,
            CommandId::StatusRes,
            &[
                &handle,
                bool_bytes(known),
                bool_bytes(running),
                numerator.to_string().as_bytes(),
                denominator.to_string().as_bytes(),
            ],
        ),
        StatusResUnique { handle, known, running, numerator, denominator } => put_frame(
            dst,
            CommandId::StatusResUnique,
            &[
                &handle,
                bool_bytes(known),
                bool_bytes(running),
                numerator.to_string().as_bytes(),
                denominator.to_string().as_bytes(),
            ],
        ),
        EchoRes { data } => put_frame(dst, CommandId::EchoRes, &[&data]),
        OptionRes { option } => put_frame(dst, CommandId::OptionRes, &[&option]),
        Error { code, text } => {
            put_frame(dst, CommandId::Error, &[code.as_bytes(), text.as_bytes()])
        },
    }

    Ok(())
}

fn bool_bytes(b: bool) -> &'static [u8] {
    if b {
        b"1"
    } else {
        b"0"
    }
}

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::IO(value)
    }
}
