//! The text admin dialect (spec §4.8): one command per line, a single
//! response per line, multi-line replies terminated by `.\n`.

use bytes::Bytes;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    Status,
    Workers,
    MaxQueue { function: Bytes, size: u32 },
    Shutdown { graceful: bool },
    Version,
    GetPid,
    CreateFunction { function: Bytes },
    DropFunction { function: Bytes },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminParseError;

/// Parses one whitespace-tokenized admin line (without its trailing `\n`).
pub fn parse_admin_line(line: &[u8]) -> Result<AdminCommand, AdminParseError> {
    let mut tokens = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|t| !t.is_empty());

    let cmd = tokens.next().ok_or(AdminParseError)?;

    Ok(match cmd {
        b"status" => AdminCommand::Status,
        b"workers" => AdminCommand::Workers,
        b"version" => AdminCommand::Version,
        b"getpid" => AdminCommand::GetPid,
        b"maxqueue" => {
            let function = tokens.next().ok_or(AdminParseError)?;
            let size = tokens.next().ok_or(AdminParseError)?;
            let size: u32 = std::str::from_utf8(size)
                .map_err(|_| AdminParseError)?
                .parse()
                .map_err(|_| AdminParseError)?;
            AdminCommand::MaxQueue { function: Bytes::copy_from_slice(function), size }
        },
        b"shutdown" => {
            let graceful = matches!(tokens.next(), Some(b"graceful"));
            AdminCommand::Shutdown { graceful }
        },
        b"create-function" => {
            let function = tokens.next().ok_or(AdminParseError)?;
            AdminCommand::CreateFunction { function: Bytes::copy_from_slice(function) }
        },
        b"drop-function" => {
            let function = tokens.next().ok_or(AdminParseError)?;
            AdminCommand::DropFunction { function: Bytes::copy_from_slice(function) }
        },
        _ => return Err(AdminParseError),
    })
}

/// One row of the `status` admin reply: `name running total worker-count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: Vec<u8>,
    pub running: u32,
    pub total: u32,
    pub workers: u32,
}

/// One row of the `workers` admin reply: `fd ip id : func1 func2 ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRow {
    pub fd: u64,
    pub ip: String,
    pub id: String,
    pub functions: Vec<Vec<u8>>,
}

pub fn format_status(rows: &[StatusRow]) -> Vec<u8> {
    let mut out = Vec::new();
    for row in rows {
        out.extend_from_slice(&row.name);
        out.push(b'\t');
        out.extend_from_slice(row.running.to_string().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(row.total.to_string().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(row.workers.to_string().as_bytes());
        out.push(b'\n');
    }
    out.extend_from_slice(b".\n");
    out
}

pub fn format_workers(rows: &[WorkerRow]) -> Vec<u8> {
    let mut out = Vec::new();
    for row in rows {
        out.extend_from_slice(row.fd.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(row.ip.as_bytes());
        out.push(b' ');
        out.extend_from_slice(row.id.as_bytes());
        out.extend_from_slice(b" :");
        for f in &row.functions {
            out.push(b' ');
            out.extend_from_slice(f);
        }
        out.push(b'\n');
    }
    out.extend_from_slice(b".\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status() {
        assert_eq!(parse_admin_line(b"status"), Ok(AdminCommand::Status));
    }

    #[test]
    fn parses_maxqueue() {
        assert_eq!(
            parse_admin_line(b"maxqueue reverse 10"),
            Ok(AdminCommand::MaxQueue { function: Bytes::from_static(b"reverse"), size: 10 })
        );
    }

    #[test]
    fn parses_shutdown_graceful() {
        assert_eq!(
            parse_admin_line(b"shutdown graceful"),
            Ok(AdminCommand::Shutdown { graceful: true })
        );
        assert_eq!(
            parse_admin_line(b"shutdown"),
            Ok(AdminCommand::Shutdown { graceful: false })
        );
    }

    #[test]
    fn formats_status_row() {
        let rows = vec![StatusRow { name: b"f".to_vec(), running: 1, total: 3, workers: 3 }];
        assert_eq!(format_status(&rows), b"f\t1\t3\t3\n.\n".to_vec());
    }

    #[test]
    fn rejects_unknown_command() {
        assert_eq!(parse_admin_line(b"frobnicate"), Err(AdminParseError));
    }
}
