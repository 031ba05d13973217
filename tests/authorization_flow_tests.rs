//! End-to-end tests of the authorization core: chain construction,
//! hierarchy propagation, token round-trips, and the role-edit guards.
//!
//! These run against the pure engine functions and need no database or
//! directory service.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use stratum_authz::error::AppError;
use stratum_authz::models::action::{names, Action};
use stratum_authz::models::hierarchy::{TypeChain, TypeLevel};
use stratum_authz::services::permission_service::{expand_grants, GrantRow};
use stratum_authz::services::role_service::{
    editor_actions, validate_action_levels,
};
use stratum_authz::services::token_service::{token_digest, SignedToken};

fn level(id: i32, name: &str, parent_id: Option<i32>) -> TypeLevel {
    TypeLevel {
        id,
        name: name.to_string(),
        parent_id,
        assignable: true,
        created_at: Utc::now(),
        deleted_at: None,
    }
}

fn chain() -> TypeChain {
    TypeChain::from_rows(vec![
        level(1, "root", None),
        level(2, "partner", Some(1)),
        level(3, "customer", Some(2)),
        level(4, "group", Some(3)),
    ])
    .unwrap()
}

// ---------------------------------------------------------------------------
// Hierarchy invariant
// ---------------------------------------------------------------------------

#[test]
fn branching_chain_is_a_fatal_configuration_error() {
    let result = TypeChain::from_rows(vec![
        level(1, "root", None),
        level(2, "partner", Some(1)),
        level(3, "reseller", Some(1)),
    ]);
    assert!(matches!(result, Err(AppError::HierarchyCorrupt(_))));
}

#[test]
fn soft_deleted_sibling_does_not_break_the_chain() {
    let mut reseller = level(3, "reseller", Some(1));
    reseller.deleted_at = Some(Utc::now());
    let chain = TypeChain::from_rows(vec![
        level(1, "root", None),
        level(2, "partner", Some(1)),
        reseller,
    ])
    .unwrap();
    assert_eq!(chain.levels().len(), 2);
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

#[test]
fn partner_grant_propagates_to_descendants_only() {
    let (r1, p1, p2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (c1, c2, c3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let g1 = Uuid::new_v4();
    let tree = json!({
        "root": {
            r1.to_string(): {
                "partner": {
                    p1.to_string(): {
                        "customer": {
                            c1.to_string(): { "group": [g1.to_string()] },
                            c2.to_string(): {},
                        }
                    },
                    p2.to_string(): {
                        "customer": { c3.to_string(): {} }
                    },
                }
            }
        }
    });

    let grants = [GrantRow {
        user_id: Uuid::nil(),
        resource_id: Some(p1),
        type_id: 2,
        action_name: "X".to_string(),
    }];
    let out = expand_grants(&chain(), &tree, &grants);
    let refs = &out["X"];

    for covered in [
        ("partner", Some(p1)),
        ("customer", Some(c1)),
        ("customer", Some(c2)),
        ("group", Some(g1)),
    ] {
        assert!(
            refs.contains(&(covered.0.to_string(), covered.1)),
            "expected {covered:?} to be covered"
        );
    }
    assert!(!refs.iter().any(|(_, id)| *id == Some(p2) || *id == Some(c3)));
}

#[test]
fn blanket_grant_covers_resources_added_later() {
    let customer_grant = GrantRow {
        user_id: Uuid::nil(),
        resource_id: None,
        type_id: 3,
        action_name: "X".to_string(),
    };

    // A customer that did not exist when the grant was created.
    let new_customer = Uuid::new_v4();
    let tree = json!({
        "customer": { new_customer.to_string(): {} }
    });

    let out = expand_grants(&chain(), &tree, &[customer_grant]);
    assert!(out["X"].contains(&("customer".to_string(), Some(new_customer))));
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[test]
fn token_round_trip_binds_user_and_salt() {
    let user_id = Uuid::new_v4();
    let caveats = vec![
        "created:1756000000".to_string(),
        "register:false".to_string(),
        "provider:local".to_string(),
    ];
    let blob = SignedToken::mint("user-salt", user_id, caveats).encode();

    let decoded = SignedToken::decode(&blob).unwrap();
    assert_eq!(decoded.user_id, user_id);
    assert!(decoded.verify("user-salt"));
    assert!(!decoded.verify("other-salt"));
}

#[test]
fn forged_blob_fails_even_with_a_stolen_signature() {
    let victim = SignedToken::mint("victim-salt", Uuid::new_v4(), vec![]);
    let forged = SignedToken {
        user_id: Uuid::new_v4(),
        caveats: victim.caveats.clone(),
        signature: victim.signature.clone(),
    };
    assert!(!forged.verify("victim-salt"));

    // The two blobs index different rows.
    assert_ne!(
        token_digest(&victim.encode()),
        token_digest(&forged.encode())
    );
}

// ---------------------------------------------------------------------------
// Role edit guards
// ---------------------------------------------------------------------------

#[test]
fn toggling_an_action_above_the_role_level_is_rejected() {
    let action = Action {
        id: Uuid::new_v4(),
        name: "CREATE_CUSTOMER".to_string(),
        type_id: 2,
        action_group_id: Uuid::new_v4(),
        order: 0,
        created_at: Utc::now(),
        deleted_at: None,
    };
    // Role grants at customer level (3); the action sits at partner (2).
    let result = validate_action_levels(&chain(), 3, &[action]);
    assert!(matches!(result, Err(AppError::WrongArguments(_))));
}

#[test]
fn own_role_edit_is_satisfied_by_edit_own_roles() {
    let candidates = editor_actions(true, false);
    assert!(candidates.contains(&names::EDIT_OWN_ROLES));
    // Without holding the role, EDIT_OWN_ROLES is never consulted.
    assert!(!editor_actions(false, false).contains(&names::EDIT_OWN_ROLES));
}

#[test]
fn sublevel_edit_is_only_offered_to_strict_ancestors() {
    assert!(editor_actions(false, true).contains(&names::EDIT_SUBLEVEL_ROLES));
    assert!(!editor_actions(false, false).contains(&names::EDIT_SUBLEVEL_ROLES));
}
