//! The service facade: opening a database, per-handler connections and
//! the event log.

mod common;

use common::{init_logging, TempDb};
use standing_core::{
    access::Actor,
    complaint_lifecycle::NewComplaint,
    config::StandingConfig,
    service::StandingService,
    types::{DeputyStatus, Role},
};

#[test]
fn open_migrates_and_handlers_share_the_database() {
    init_logging();
    let db = TempDb::new();
    let service = StandingService::open(db.path_str(), StandingConfig::default()).unwrap();
    // Migrations are idempotent.
    service.store().migrate().unwrap();

    let admin = service.register_account("Admin").unwrap();
    service.bootstrap_admin(&admin.account_id).unwrap();
    let admin = Actor::new(admin.account_id);

    let other = service.handler().unwrap();
    let citizen = other.register_account("Cleo").unwrap();
    let profile = service
        .promote_to_deputy(&admin, &citizen.account_id, DeputyStatus::Current)
        .unwrap();

    assert!(other.has_role(&citizen.account_id, Role::Deputy).unwrap());
    assert_eq!(other.deputy_profile(&profile.deputy_id).unwrap(), profile);
}

#[test]
fn every_committed_change_is_in_the_event_log() {
    let db = TempDb::new();
    let service = StandingService::open(db.path_str(), StandingConfig::default()).unwrap();
    let admin = service.register_account("Admin").unwrap();
    service.bootstrap_admin(&admin.account_id).unwrap();
    let admin = Actor::new(admin.account_id);

    let complaint = service
        .file_complaint(
            &admin,
            NewComplaint {
                title:       "Graffiti".into(),
                description: "On the library wall".into(),
                category:    "vandalism".into(),
                priority:    "low".into(),
            },
        )
        .unwrap();
    service.begin_review(&admin, &complaint.complaint_id, None).unwrap();

    let log = service.store().recent_events(10).unwrap();
    let types: Vec<&str> = log.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["complaint_filed", "complaint_transitioned"]);
    assert!(log.iter().all(|e| e.source == "complaint"));
    assert!(log[1].payload.contains("\"to\":\"under_review\""));
}
