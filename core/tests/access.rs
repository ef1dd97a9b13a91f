//! Capability checks and the role set per account.

mod common;

use common::Fixture;
use standing_core::{
    access::{authorize, Actor, Capability},
    error::StandingError,
    role_elevation::ManagerPermissions,
    types::Role,
};

fn allowed(fx: &Fixture, actor: &Actor, capability: Capability) -> bool {
    match authorize(fx.service.store(), actor, capability) {
        Ok(()) => true,
        Err(StandingError::PermissionDenied(_)) => false,
        Err(e) => panic!("unexpected error {e:?}"),
    }
}

#[test]
fn capability_matrix() {
    let fx = Fixture::in_memory();
    let citizen = fx.citizen("Cit");
    let (deputy, _) = fx.deputy("Dep");
    let manager = fx.citizen("Man");
    fx.service
        .promote_to_manager(&fx.admin, &manager.account_id, ManagerPermissions::default())
        .unwrap();

    use Capability::*;
    let all = [ManageRoles, SetBaseline, ManageComplaints, RateDeputies, FileComplaints, ActAsDeputy];
    for cap in all {
        assert!(allowed(&fx, &fx.admin, cap), "admin lacks {cap:?}");
    }
    assert!(allowed(&fx, &citizen, RateDeputies));
    assert!(allowed(&fx, &citizen, FileComplaints));
    assert!(!allowed(&fx, &citizen, ManageComplaints));
    assert!(!allowed(&fx, &citizen, ActAsDeputy));

    assert!(allowed(&fx, &manager, ManageComplaints));
    assert!(!allowed(&fx, &manager, ManageRoles));
    assert!(!allowed(&fx, &manager, SetBaseline));

    // A deputy keeps the citizen role alongside.
    assert!(allowed(&fx, &deputy, ActAsDeputy));
    assert!(allowed(&fx, &deputy, RateDeputies));
    assert!(!allowed(&fx, &deputy, ManageComplaints));
}

#[test]
fn unknown_actor_has_no_capabilities() {
    let fx = Fixture::in_memory();
    let nobody = Actor::new("nobody");
    assert!(!allowed(&fx, &nobody, Capability::FileComplaints));
    let err = fx.service.submit_rating(&nobody, "any-deputy", 4).unwrap_err();
    assert!(matches!(err, StandingError::PermissionDenied(_)));
}

#[test]
fn registration_grants_citizen_only() {
    let fx = Fixture::in_memory();
    let citizen = fx.citizen("New");
    assert_eq!(fx.service.roles_for(&citizen.account_id).unwrap(), vec![Role::Citizen]);
    let err = fx.service.register_account("   ").unwrap_err();
    assert!(matches!(err, StandingError::Validation(_)));
}

#[test]
fn bootstrap_admin_twice_is_already_elevated() {
    let fx = Fixture::in_memory();
    let err = fx.service.bootstrap_admin(&fx.admin.account_id).unwrap_err();
    assert!(matches!(err, StandingError::AlreadyElevated { role: Role::Admin, .. }), "got {err:?}");
}
