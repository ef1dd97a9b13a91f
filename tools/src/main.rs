//! standing-runner: headless host for the standing service.
//!
//! Usage:
//!   standing-runner --db standing.db                 run due jobs once, print a summary
//!   standing-runner --db standing.db --ipc-mode      JSON-lines requests on stdin
//!   standing-runner --config standing.json ...       override StandingConfig defaults

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use standing_core::{
    access::Actor,
    complaint_lifecycle::{ComplaintStatus, NewComplaint},
    config::StandingConfig,
    error::{StandingError, StandingResult},
    role_elevation::ManagerPermissions,
    service::StandingService,
    types::DeputyStatus,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    RunJobs,
    Register {
        display_name: String,
    },
    BootstrapAdmin {
        account_id: String,
    },
    PromoteDeputy {
        actor:      String,
        account_id: String,
        #[serde(default = "default_deputy_status")]
        status:     DeputyStatus,
    },
    PromoteManager {
        actor:       String,
        account_id:  String,
        #[serde(default)]
        permissions: ManagerPermissions,
    },
    DemoteManager {
        actor:      String,
        account_id: String,
    },
    SetBaseline {
        actor:     String,
        deputy_id: String,
        average:   f64,
        count:     i64,
    },
    Rate {
        actor:     String,
        deputy_id: String,
        value:     i64,
    },
    FileComplaint {
        actor:     String,
        complaint: NewComplaint,
    },
    BeginReview {
        actor:            String,
        complaint_id:     String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Assign {
        actor:            String,
        complaint_id:     String,
        deputy_id:        String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Accept {
        actor:            String,
        complaint_id:     String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Decline {
        actor:            String,
        complaint_id:     String,
        reason:           String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Hold {
        actor:            String,
        complaint_id:     String,
        category:         String,
        until:            DateTime<Utc>,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    ReleaseHold {
        actor:            String,
        complaint_id:     String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    UpdatePriority {
        actor:            String,
        complaint_id:     String,
        priority:         String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Resolve {
        actor:            String,
        complaint_id:     String,
        points:           i64,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Reject {
        actor:            String,
        complaint_id:     String,
        reason:           String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Close {
        actor:            String,
        complaint_id:     String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Archive {
        actor:            String,
        complaint_id:     String,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    GetComplaint {
        complaint_id: String,
    },
    Leaderboard,
    Quit,
}

fn default_deputy_status() -> DeputyStatus {
    DeputyStatus::Candidate
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config = match flag_value(&args, "--config") {
        Some(path) => StandingConfig::load(path)?,
        None => StandingConfig::default(),
    };

    // Jobs run on their own connections, so an in-memory database has to be
    // a named shared-cache one for them to see the same data.
    let db_effective = if db == ":memory:" {
        format!("file:standing_{}?mode=memory&cache=shared", std::process::id())
    } else {
        db.to_string()
    };
    let service = StandingService::open(&db_effective, config)?;
    let mut scheduler = service.scheduler()?;

    if ipc_mode {
        run_ipc_loop(&service, &mut scheduler)?;
    } else {
        println!("standing-runner");
        println!("  db:    {db}");
        println!("  jobs:  {}", scheduler.job_names().join(", "));
        println!();
        let events = scheduler.run_due()?;
        println!("  events emitted: {}", events.len());
        print_summary(&service)?;
    }
    Ok(())
}

fn run_ipc_loop(
    service:   &StandingService,
    scheduler: &mut standing_core::scheduler::Scheduler,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if handle.read_line(&mut buffer)? == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<IpcCommand>(&buffer) {
            Err(e) => json!({ "error": "bad_request", "message": e.to_string() }),
            Ok(IpcCommand::Quit) => break,
            Ok(IpcCommand::RunJobs) => respond(scheduler.run_due()),
            Ok(cmd) => handle_command(service, cmd),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(service: &StandingService, cmd: IpcCommand) -> Value {
    match cmd {
        IpcCommand::Register { display_name } => respond(service.register_account(&display_name)),
        IpcCommand::BootstrapAdmin { account_id } => respond(service.bootstrap_admin(&account_id)),
        IpcCommand::PromoteDeputy { actor, account_id, status } => {
            respond(service.promote_to_deputy(&Actor::new(actor), &account_id, status))
        }
        IpcCommand::PromoteManager { actor, account_id, permissions } => {
            respond(service.promote_to_manager(&Actor::new(actor), &account_id, permissions))
        }
        IpcCommand::DemoteManager { actor, account_id } => {
            respond(service.demote_manager(&Actor::new(actor), &account_id))
        }
        IpcCommand::SetBaseline { actor, deputy_id, average, count } => {
            respond(service.set_baseline(&Actor::new(actor), &deputy_id, average, count))
        }
        IpcCommand::Rate { actor, deputy_id, value } => {
            respond(service.submit_rating(&Actor::new(actor), &deputy_id, value))
        }
        IpcCommand::FileComplaint { actor, complaint } => {
            respond(service.file_complaint(&Actor::new(actor), complaint))
        }
        IpcCommand::BeginReview { actor, complaint_id, expected_version } => {
            respond(service.begin_review(&Actor::new(actor), &complaint_id, expected_version))
        }
        IpcCommand::Assign { actor, complaint_id, deputy_id, expected_version } => respond(
            service.assign_complaint(&Actor::new(actor), &complaint_id, &deputy_id, expected_version),
        ),
        IpcCommand::Accept { actor, complaint_id, expected_version } => {
            respond(service.deputy_accept(&Actor::new(actor), &complaint_id, expected_version))
        }
        IpcCommand::Decline { actor, complaint_id, reason, expected_version } => respond(
            service.deputy_reject(&Actor::new(actor), &complaint_id, &reason, expected_version),
        ),
        IpcCommand::Hold { actor, complaint_id, category, until, expected_version } => {
            respond(service.hold_complaint(
                &Actor::new(actor),
                &complaint_id,
                &category,
                until,
                expected_version,
            ))
        }
        IpcCommand::ReleaseHold { actor, complaint_id, expected_version } => {
            respond(service.release_hold(&Actor::new(actor), &complaint_id, expected_version))
        }
        IpcCommand::UpdatePriority { actor, complaint_id, priority, expected_version } => respond(
            service.update_priority(&Actor::new(actor), &complaint_id, &priority, expected_version),
        ),
        IpcCommand::Resolve { actor, complaint_id, points, expected_version } => respond(
            service.resolve_complaint(&Actor::new(actor), &complaint_id, points, expected_version),
        ),
        IpcCommand::Reject { actor, complaint_id, reason, expected_version } => respond(
            service.reject_complaint(&Actor::new(actor), &complaint_id, &reason, expected_version),
        ),
        IpcCommand::Close { actor, complaint_id, expected_version } => {
            respond(service.close_complaint(&Actor::new(actor), &complaint_id, expected_version))
        }
        IpcCommand::Archive { actor, complaint_id, expected_version } => {
            respond(service.archive_complaint(&Actor::new(actor), &complaint_id, expected_version))
        }
        IpcCommand::GetComplaint { complaint_id } => respond(service.complaint(&complaint_id)),
        IpcCommand::Leaderboard => respond(service.leaderboard().and_then(|scores| {
            let as_of = service.latest_ranking()?.map(|r| r.as_of);
            Ok(json!({ "as_of": as_of, "scores": scores }))
        })),
        IpcCommand::RunJobs | IpcCommand::Quit => json!({ "error": "unreachable" }),
    }
}

fn respond<T: serde::Serialize>(result: StandingResult<T>) -> Value {
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({ "error": error_kind(&e), "message": e.to_string() }),
    }
}

/// Stable machine-readable error names for the UI.
fn error_kind(e: &StandingError) -> &'static str {
    match e {
        StandingError::Validation(_) => "validation",
        StandingError::AccountNotFound(_)
        | StandingError::DeputyNotFound(_)
        | StandingError::ComplaintNotFound(_) => "not_found",
        StandingError::AlreadyElevated { .. } => "already_elevated",
        StandingError::Conflict(_) => "conflict",
        StandingError::InvalidTransition { .. } => "invalid_transition",
        StandingError::ReassignmentLimitExceeded { .. } => "reassignment_limit",
        StandingError::HoldLimitExceeded { .. } => "hold_limit",
        StandingError::ConcurrentModification { .. } => "concurrent_modification",
        StandingError::PermissionDenied(_) => "permission_denied",
        StandingError::Cancelled => "cancelled",
        StandingError::Storage(_) | StandingError::Serialization(_) | StandingError::Other(_) => {
            "internal"
        }
    }
}

fn print_summary(service: &StandingService) -> Result<()> {
    let store = service.store();
    println!("=== COMPLAINTS ===");
    for status in [
        ComplaintStatus::New,
        ComplaintStatus::UnderReview,
        ComplaintStatus::Assigned,
        ComplaintStatus::InProgress,
        ComplaintStatus::Reassigned,
        ComplaintStatus::Resolved,
        ComplaintStatus::Rejected,
        ComplaintStatus::Closed,
        ComplaintStatus::Archived,
    ] {
        println!("  {:<13} {}", status.as_str(), store.complaint_count_by_status(status)?);
    }

    println!();
    println!("=== LEADERBOARD ===");
    match service.latest_ranking()? {
        Some(report) => println!("  as of {} ({} ranked)", report.as_of, report.ranked),
        None => println!("  (never ranked)"),
    }
    for score in service.leaderboard()?.iter().take(10) {
        println!(
            "  #{:<3} {} | points {} | resolved {} | avg hours {}",
            score.rank.map_or("-".to_string(), |r| r.to_string()),
            score.deputy_id,
            score.total_points,
            score.complaints_resolved,
            score
                .average_resolution_hours
                .map_or("-".to_string(), |h| format!("{h:.1}")),
        );
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
