//! Dispatches one decoded packet against the [`Registry`] (spec §4.4). Holds
//! the registry lock for exactly the duration of this call; the caller
//! delivers the returned packets to their target connections only after the
//! lock is released.

use std::time::Duration;

use bytes::Bytes;

use crate::registry::{Delivery, Registry};
use crate::types::connection::ConnId;
use crate::wire::admin::{self, AdminCommand};
use crate::wire::events::GearmanEvent;
use crate::wire::protocol::{Command, Outbound, Response};

/// The result of handling one packet: an optional immediate reply to the
/// connection that sent it, plus any packets destined for other connections
/// (worker wakeups, client fan-out).
pub struct Outcome {
    pub reply: Option<Outbound>,
    pub deliveries: Vec<Delivery>,
}

impl Outcome {
    fn reply_only(reply: Outbound) -> Self {
        Self { reply: Some(reply), deliveries: Vec::new() }
    }

    fn none() -> Self {
        Self { reply: None, deliveries: Vec::new() }
    }
}

pub fn handle_event(registry: &mut Registry, conn: ConnId, event: GearmanEvent) -> Outcome {
    match event {
        GearmanEvent::Command(cmd) => handle_command(registry, conn, cmd),
        GearmanEvent::Admin(cmd) => handle_admin(registry, conn, cmd),
    }
}

fn handle_command(registry: &mut Registry, conn: ConnId, cmd: Command) -> Outcome {
    match cmd {
        Command::CanDo { function } => {
            registry.can_do(conn, function, None);
            Outcome::none()
        },
        Command::CanDoTimeout { function, timeout } => {
            registry.can_do(conn, function, Some(Duration::from_secs(timeout as u64)));
            Outcome::none()
        },
        Command::CantDo { function } => {
            registry.cant_do(conn, &function);
            Outcome::none()
        },
        Command::ResetAbilities => {
            registry.reset_abilities(conn);
            Outcome::none()
        },
        Command::PreSleep => match registry.pre_sleep(conn) {
            Some(reply) => Outcome::reply_only(reply),
            None => Outcome::none(),
        },
        Command::SubmitJob { function, unique, data, priority, background, epoch } => {
            let (reply, deliveries) =
                registry.submit_job(conn, function, unique, data, priority, background, epoch);
            Outcome { reply, deliveries }
        },
        Command::SubmitReduceJob { function, unique, reducer, priority, epoch, data, background } => {
            let (reply, deliveries) = registry
                .submit_reduce_job(conn, function, unique, reducer, priority, epoch, data, background);
            Outcome { reply, deliveries }
        },
        Command::GrabJob => match registry.grab_job(conn, false, false) {
            Some(reply) => Outcome::reply_only(reply),
            None => Outcome::none(),
        },
        Command::GrabJobUniq => match registry.grab_job(conn, true, false) {
            Some(reply) => Outcome::reply_only(reply),
            None => Outcome::none(),
        },
        Command::GrabJobAll => match registry.grab_job(conn, false, true) {
            Some(reply) => Outcome::reply_only(reply),
            None => Outcome::none(),
        },
        Command::WorkData { handle, data } => {
            Outcome { reply: None, deliveries: registry.work_data(&handle, data) }
        },
        Command::WorkWarning { handle, data } => {
            Outcome { reply: None, deliveries: registry.work_warning(&handle, data) }
        },
        Command::WorkStatus { handle, numerator, denominator } => {
            Outcome { reply: None, deliveries: registry.work_status(&handle, numerator, denominator) }
        },
        Command::WorkComplete { handle, data } => {
            Outcome { reply: None, deliveries: registry.work_complete(&handle, data) }
        },
        Command::WorkFail { handle } => {
            Outcome { reply: None, deliveries: registry.work_fail(&handle) }
        },
        Command::WorkException { handle, data } => {
            Outcome { reply: None, deliveries: registry.work_exception(&handle, data) }
        },
        Command::GetStatus { handle } => Outcome::reply_only(registry.get_status(&handle)),
        Command::GetStatusUnique { unique } => {
            Outcome::reply_only(registry.get_status_unique(&unique))
        },
        Command::EchoReq { data } => Outcome::reply_only(Outbound::from(Response::EchoRes { data })),
        Command::OptionReq { option } => {
            if option.as_ref() == b"exceptions" {
                registry.set_exceptions(conn, true);
                Outcome::reply_only(Outbound::from(Response::OptionRes { option }))
            } else {
                Outcome::reply_only(Outbound::from(Response::error(
                    "unknown_option",
                    "unknown option",
                )))
            }
        },
        Command::SetClientId { id } => {
            registry.set_client_id(conn, id);
            Outcome::none()
        },
        Command::AllYours => {
            registry.all_yours(conn);
            Outcome::none()
        },
    }
}

fn handle_admin(registry: &mut Registry, _conn: ConnId, cmd: AdminCommand) -> Outcome {
    match cmd {
        AdminCommand::Status => {
            Outcome::reply_only(Outbound::Text(Bytes::from(admin::format_status(&registry.status_rows()))))
        },
        AdminCommand::Workers => {
            Outcome::reply_only(Outbound::Text(Bytes::from(admin::format_workers(&registry.worker_rows()))))
        },
        AdminCommand::MaxQueue { function, size } => {
            registry.max_queue(function, size);
            Outcome::reply_only(Outbound::Text(Bytes::from_static(b"OK\n")))
        },
        AdminCommand::Shutdown { graceful } => {
            let _ = graceful;
            // Disconnection teardown runs normally when the connection task
            // exits; the actual shutdown signal is handled at the server
            // level (see `server::mod`), this just acks the admin command.
            Outcome::reply_only(Outbound::Text(Bytes::from_static(b"OK\n")))
        },
        AdminCommand::Version => {
            Outcome::reply_only(Outbound::Text(Bytes::from(format!(
                "OK {}\n",
                env!("CARGO_PKG_VERSION")
            ))))
        },
        AdminCommand::GetPid => {
            Outcome::reply_only(Outbound::Text(Bytes::from(format!("OK {}\n", std::process::id()))))
        },
        AdminCommand::CreateFunction { function } => {
            registry.create_function(function);
            Outcome::reply_only(Outbound::Text(Bytes::from_static(b"OK\n")))
        },
        AdminCommand::DropFunction { function } => {
            registry.drop_function(&function);
            Outcome::reply_only(Outbound::Text(Bytes::from_static(b"OK\n")))
        },
    }
}
