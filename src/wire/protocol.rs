//! Command identifiers, and the typed `Command`/`Response` packet shapes
//! built on top of them. The command ids are fixed by the wire protocol
//! (spec §6) and must not be renumbered.

use bytes::Bytes;

/// Fixed command ids. A reimplementation must use exactly these integers for
/// wire compatibility with existing clients/workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    CanDo = 1,
    CantDo = 2,
    ResetAbilities = 3,
    PreSleep = 4,
    Noop = 6,
    SubmitJob = 7,
    JobCreated = 8,
    GrabJob = 9,
    NoJob = 10,
    JobAssign = 11,
    WorkStatus = 12,
    WorkComplete = 13,
    WorkFail = 14,
    GetStatus = 15,
    EchoReq = 16,
    EchoRes = 17,
    SubmitJobBg = 18,
    Error = 19,
    StatusRes = 20,
    SubmitJobHigh = 21,
    SetClientId = 22,
    CanDoTimeout = 23,
    AllYours = 24,
    WorkException = 25,
    OptionReq = 26,
    OptionRes = 27,
    WorkData = 28,
    WorkWarning = 29,
    GrabJobUniq = 30,
    JobAssignUniq = 31,
    SubmitJobHighBg = 32,
    SubmitJobLow = 33,
    SubmitJobLowBg = 34,
    SubmitJobEpoch = 36,
    SubmitReduceJob = 37,
    SubmitReduceJobBackground = 38,
    GrabJobAll = 39,
    JobAssignAll = 40,
    GetStatusUnique = 41,
    StatusResUnique = 42,
}

impl CommandId {
    pub const MAX: u32 = 43;

    pub fn from_u32(v: u32) -> Option<Self> {
        use CommandId::*;
        Some(match v {
            1 => CanDo,
            2 => CantDo,
            3 => ResetAbilities,
            4 => PreSleep,
            6 => Noop,
            7 => SubmitJob,
            8 => JobCreated,
            9 => GrabJob,
            10 => NoJob,
            11 => JobAssign,
            12 => WorkStatus,
            13 => WorkComplete,
            14 => WorkFail,
            15 => GetStatus,
            16 => EchoReq,
            17 => EchoRes,
            18 => SubmitJobBg,
            19 => Error,
            20 => StatusRes,
            21 => SubmitJobHigh,
            22 => SetClientId,
            23 => CanDoTimeout,
            24 => AllYours,
            25 => WorkException,
            26 => OptionReq,
            27 => OptionRes,
            28 => WorkData,
            29 => WorkWarning,
            30 => GrabJobUniq,
            31 => JobAssignUniq,
            32 => SubmitJobHighBg,
            33 => SubmitJobLow,
            34 => SubmitJobLowBg,
            36 => SubmitJobEpoch,
            37 => SubmitReduceJob,
            38 => SubmitReduceJobBackground,
            39 => GrabJobAll,
            40 => JobAssignAll,
            41 => GetStatusUnique,
            42 => StatusResUnique,
            _ => return None,
        })
    }
}

/// Job priority. Ordered HIGH before NORMAL before LOW for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];
}

/// A decoded request, sent client-or-worker to server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    CanDo { function: Bytes },
    CanDoTimeout { function: Bytes, timeout: u32 },
    CantDo { function: Bytes },
    ResetAbilities,
    PreSleep,
    SubmitJob {
        function: Bytes,
        unique: Bytes,
        data: Bytes,
        priority: Priority,
        background: bool,
        epoch: Option<i64>,
    },
    SubmitReduceJob {
        function: Bytes,
        unique: Bytes,
        reducer: Bytes,
        priority: Priority,
        epoch: Option<i64>,
        data: Bytes,
        background: bool,
    },
    GrabJob,
    GrabJobUniq,
    GrabJobAll,
    WorkData { handle: Bytes, data: Bytes },
    WorkWarning { handle: Bytes, data: Bytes },
    WorkStatus { handle: Bytes, numerator: u32, denominator: u32 },
    WorkComplete { handle: Bytes, data: Bytes },
    WorkFail { handle: Bytes },
    WorkException { handle: Bytes, data: Bytes },
    GetStatus { handle: Bytes },
    GetStatusUnique { unique: Bytes },
    EchoReq { data: Bytes },
    OptionReq { option: Bytes },
    SetClientId { id: Bytes },
    AllYours,
}

/// A packet sent server to client-or-worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Noop,
    JobCreated { handle: Bytes },
    NoJob,
    JobAssign { handle: Bytes, function: Bytes, data: Bytes },
    JobAssignUniq { handle: Bytes, function: Bytes, unique: Bytes, data: Bytes },
    JobAssignAll {
        handle: Bytes,
        function: Bytes,
        unique: Bytes,
        reducer: Bytes,
        data: Bytes,
    },
    WorkData { handle: Bytes, data: Bytes },
    WorkWarning { handle: Bytes, data: Bytes },
    WorkStatus { handle: Bytes, numerator: u32, denominator: u32 },
    WorkComplete { handle: Bytes, data: Bytes },
    WorkFail { handle: Bytes },
    WorkException { handle: Bytes, data: Bytes },
    StatusRes {
        handle: Bytes,
        known: bool,
        running: bool,
        numerator: u32,
        denominator: u32,
    },
    StatusResUnique {
        handle: Bytes,
        known: bool,
        running: bool,
        numerator: u32,
        denominator: u32,
    },
    EchoRes { data: Bytes },
    OptionRes { option: Bytes },
    Error { code: &'static str, text: String },
}

impl Response {
    pub fn error(code: &'static str, text: impl Into<String>) -> Self {
        Response::Error { code, text: text.into() }
    }
}

/// What the codec actually writes to the socket: a framed binary response,
/// or a raw line/block of text (admin replies, which have no framing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Binary(Response),
    Text(Bytes),
}

impl From<Response> for Outbound {
    fn from(r: Response) -> Self {
        Outbound::Binary(r)
    }
}
