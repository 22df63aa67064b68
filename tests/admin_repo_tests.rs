//! End-to-end repository behavior against a real in-memory database.

use std::sync::Arc;

use assert_matches::assert_matches;
use uuid::Uuid;

use gatehouse::db::schema_sync::sync_all_tables;
use gatehouse::db::{Database, connect_memory};
use gatehouse::entities::{
    GroupCreate, Menu, MenuCreate, Permission, PermissionCreate, Role, RoleCreate, User,
    UserCreate, UserQuery, UserUpdate,
};
use gatehouse::entities::group::Group;
use gatehouse::errors::AppError;
use gatehouse::i18n::Locale;
use gatehouse::orm::{ConstraintCache, Entity, Repository, SqlValue};

const EN: Locale = Locale::EnUs;

async fn setup() -> (Database, Arc<ConstraintCache>) {
    let pool = connect_memory().await.unwrap();
    sync_all_tables(&pool).await.unwrap();
    (pool, Arc::new(ConstraintCache::new()))
}

fn user_payload(name: &str, email: Option<&str>, phone: Option<&str>) -> UserCreate {
    UserCreate {
        name: name.to_string(),
        password: "hashed".to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        avatar: None,
        is_active: Some(true),
        auth_info: None,
        group_id: None,
        role_id: None,
    }
}

async fn seed_permission(
    pool: &Database,
    cache: &Arc<ConstraintCache>,
    url: &str,
    method: &str,
) -> Permission {
    let repo = Repository::<Permission>::new(cache.clone());
    repo.create(
        pool,
        EN,
        &PermissionCreate {
            id: Uuid::new_v4(),
            name: format!("{method} {url}"),
            url: url.to_string(),
            method: method.to_string(),
            tag: "Test".to_string(),
        },
        &[],
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    repo.create(&pool, EN, &user_payload("a", Some("x@y.z"), None), &[])
        .await
        .unwrap();
    let err = repo
        .create(&pool, EN, &user_payload("b", Some("x@y.z"), None), &[])
        .await
        .unwrap_err();
    assert_matches!(err, AppError::AlreadyExists { .. });
}

#[tokio::test]
async fn absent_unique_column_skips_the_check() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    // Neither user supplies an email; the email unique group never fires.
    repo.create(&pool, EN, &user_payload("a", None, Some("111")), &[])
        .await
        .unwrap();
    repo.create(&pool, EN, &user_payload("b", None, Some("222")), &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn composite_unique_group_needs_every_column() {
    let (pool, cache) = setup().await;
    let repo = Repository::<Permission>::new(cache.clone());

    seed_permission(&pool, &cache, "/x", "GET").await;
    // Same url, different method: the (url, method) group does not collide.
    seed_permission(&pool, &cache, "/x", "POST").await;

    let err = repo
        .create(
            &pool,
            EN,
            &PermissionCreate {
                id: Uuid::new_v4(),
                name: "dup".to_string(),
                url: "/x".to_string(),
                method: "GET".to_string(),
                tag: "Test".to_string(),
            },
            &[],
        )
        .await
        .unwrap_err();
    assert_matches!(err, AppError::AlreadyExists { .. });
}

#[tokio::test]
async fn update_does_not_collide_with_itself() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    let user = repo
        .create(&pool, EN, &user_payload("a", Some("x@y.z"), None), &[])
        .await
        .unwrap();

    // No email in the payload: the persisted email is the effective value
    // and the row's own id is excluded from the probe.
    let update = UserUpdate {
        name: Some("renamed".to_string()),
        ..Default::default()
    };
    let updated = repo.update(&pool, EN, &user, &update, &[]).await.unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.email.as_deref(), Some("x@y.z"));
}

#[tokio::test]
async fn update_to_occupied_email_is_a_conflict() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    repo.create(&pool, EN, &user_payload("a", Some("a@y.z"), None), &[])
        .await
        .unwrap();
    let b = repo
        .create(&pool, EN, &user_payload("b", Some("b@y.z"), None), &[])
        .await
        .unwrap();

    let update = UserUpdate {
        email: Some(Some("a@y.z".to_string())),
        ..Default::default()
    };
    let err = repo.update(&pool, EN, &b, &update, &[]).await.unwrap_err();
    assert_matches!(err, AppError::AlreadyExists { .. });
}

#[tokio::test]
async fn explicit_null_clears_a_tri_state_field() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    let user = repo
        .create(&pool, EN, &user_payload("a", Some("x@y.z"), Some("111")), &[])
        .await
        .unwrap();

    let update: UserUpdate = serde_json::from_str(r#"{"email": null}"#).unwrap();
    let updated = repo.update(&pool, EN, &user, &update, &[]).await.unwrap();
    assert_eq!(updated.email, None);
    assert_eq!(updated.phone.as_deref(), Some("111"));
}

#[tokio::test]
async fn dangling_foreign_key_is_not_found() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    let mut payload = user_payload("a", Some("x@y.z"), None);
    payload.group_id = Some(999);
    let err = repo.create(&pool, EN, &payload, &[]).await.unwrap_err();
    assert_matches!(err, AppError::NotFound { .. });
}

#[tokio::test]
async fn mergeable_map_merges_key_by_key() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    let mut payload = user_payload("a", Some("x@y.z"), None);
    payload.auth_info = Some(serde_json::json!({"github": "alice", "theme": "dark"}));
    let user = repo.create(&pool, EN, &payload, &[]).await.unwrap();

    let update = UserUpdate {
        auth_info: Some(Some(serde_json::json!({"theme": "light"}))),
        ..Default::default()
    };
    let updated = repo.update(&pool, EN, &user, &update, &[]).await.unwrap();
    let info = updated.auth_info.unwrap();
    assert_eq!(info["github"], "alice");
    assert_eq!(info["theme"], "light");
}

#[tokio::test]
async fn count_is_invariant_to_pagination() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    for i in 0..5 {
        repo.create(
            &pool,
            EN,
            &user_payload(&format!("u{i}"), Some(&format!("u{i}@y.z")), None),
            &[],
        )
        .await
        .unwrap();
    }

    let query = UserQuery {
        limit: Some(2),
        offset: Some(2),
        ..Default::default()
    };
    let (total, items) = repo.list_and_count(&pool, &query, &[]).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn relationship_update_reconciles_to_the_desired_set() {
    let (pool, cache) = setup().await;
    let role_repo = Repository::<Role>::new(cache.clone());

    let p1 = seed_permission(&pool, &cache, "/a", "GET").await;
    let p2 = seed_permission(&pool, &cache, "/b", "GET").await;
    let p3 = seed_permission(&pool, &cache, "/c", "GET").await;

    let role = role_repo
        .create(
            &pool,
            EN,
            &RoleCreate {
                name: "Editor".to_string(),
                slug: "editor".to_string(),
                description: None,
                permission_ids: None,
                menu_ids: None,
            },
            &["permission_ids", "menu_ids"],
        )
        .await
        .unwrap();

    let attach = |ids: Vec<Uuid>| -> Vec<SqlValue> { ids.into_iter().map(Into::into).collect() };

    role_repo
        .update_relationship_field::<Permission>(
            &pool,
            EN,
            &role,
            Role::PERMISSIONS,
            &attach(vec![p1.id, p2.id]),
        )
        .await
        .unwrap();
    role_repo
        .update_relationship_field::<Permission>(
            &pool,
            EN,
            &role,
            Role::PERMISSIONS,
            &attach(vec![p2.id, p3.id]),
        )
        .await
        .unwrap();

    let fetched = role_repo
        .get_one_or_404(&pool, EN, role.id_value(), &["permissions"])
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = fetched
        .permissions
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    ids.sort();
    let mut expected = vec![p2.id, p3.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn relationship_update_is_idempotent() {
    let (pool, cache) = setup().await;
    let role_repo = Repository::<Role>::new(cache.clone());

    let p1 = seed_permission(&pool, &cache, "/a", "GET").await;
    let role = role_repo
        .create(
            &pool,
            EN,
            &RoleCreate {
                name: "Viewer".to_string(),
                slug: "viewer".to_string(),
                description: None,
                permission_ids: None,
                menu_ids: None,
            },
            &["permission_ids", "menu_ids"],
        )
        .await
        .unwrap();

    let desired: Vec<SqlValue> = vec![p1.id.into()];
    for _ in 0..3 {
        role_repo
            .update_relationship_field::<Permission>(&pool, EN, &role, Role::PERMISSIONS, &desired)
            .await
            .unwrap();
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role_permission WHERE role_id = ?")
        .bind(role.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn relationship_update_rejects_unknown_ids() {
    let (pool, cache) = setup().await;
    let role_repo = Repository::<Role>::new(cache.clone());

    let role = role_repo
        .create(
            &pool,
            EN,
            &RoleCreate {
                name: "Ghost".to_string(),
                slug: "ghost".to_string(),
                description: None,
                permission_ids: None,
                menu_ids: None,
            },
            &["permission_ids", "menu_ids"],
        )
        .await
        .unwrap();

    let err = role_repo
        .update_relationship_field::<Permission>(
            &pool,
            EN,
            &role,
            Role::PERMISSIONS,
            &[Uuid::new_v4().into()],
        )
        .await
        .unwrap_err();
    assert_matches!(err, AppError::NotFound { .. });
}

#[tokio::test]
async fn menu_delete_cascades_to_children() {
    let (pool, cache) = setup().await;
    let repo = Repository::<Menu>::new(cache);

    let parent = MenuCreate {
        id: 1,
        name: "root".to_string(),
        hidden: false,
        redirect: String::new(),
        hide_children_in_menu: false,
        sort_order: 0,
        title: "Root".to_string(),
        icon: None,
        keep_alive: false,
        hidden_header_content: false,
        permission: vec![],
        parent_id: None,
    };
    let child = MenuCreate {
        id: 2,
        name: "leaf".to_string(),
        parent_id: Some(1),
        sort_order: 1,
        title: "Leaf".to_string(),
        ..parent_clone(&parent)
    };
    let parent = repo.create(&pool, EN, &parent, &[]).await.unwrap();
    repo.create(&pool, EN, &child, &[]).await.unwrap();

    repo.delete(&pool, &parent).await.unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

fn parent_clone(base: &MenuCreate) -> MenuCreate {
    MenuCreate {
        id: base.id,
        name: base.name.clone(),
        hidden: base.hidden,
        redirect: base.redirect.clone(),
        hide_children_in_menu: base.hide_children_in_menu,
        sort_order: base.sort_order,
        title: base.title.clone(),
        icon: base.icon.clone(),
        keep_alive: base.keep_alive,
        hidden_header_content: base.hidden_header_content,
        permission: base.permission.clone(),
        parent_id: base.parent_id,
    }
}

#[tokio::test]
async fn group_role_brief_is_hydrated() {
    let (pool, cache) = setup().await;
    let role_repo = Repository::<Role>::new(cache.clone());
    let group_repo = Repository::<Group>::new(cache.clone());
    let user_repo = Repository::<User>::new(cache);

    let role = role_repo
        .create(
            &pool,
            EN,
            &RoleCreate {
                name: "Staff".to_string(),
                slug: "staff".to_string(),
                description: None,
                permission_ids: None,
                menu_ids: None,
            },
            &["permission_ids", "menu_ids"],
        )
        .await
        .unwrap();
    let group = group_repo
        .create(
            &pool,
            EN,
            &GroupCreate {
                name: "Ops".to_string(),
                description: None,
                role_id: Some(role.id),
            },
            &[],
        )
        .await
        .unwrap();

    let mut payload = user_payload("a", Some("x@y.z"), None);
    payload.group_id = Some(group.id);
    user_repo.create(&pool, EN, &payload, &[]).await.unwrap();

    let fetched = group_repo
        .get_one_or_404(&pool, EN, group.id_value(), &["role", "user_count"])
        .await
        .unwrap();
    assert_eq!(fetched.role.unwrap().name, "Staff");
    assert_eq!(fetched.user_count, Some(1));
}

#[tokio::test]
async fn localized_not_found_message() {
    let (pool, cache) = setup().await;
    let repo = Repository::<User>::new(cache);

    let err = repo
        .get_one_or_404(&pool, Locale::ZhCn, SqlValue::Int(42), &[])
        .await
        .unwrap_err();
    assert_matches!(err, AppError::NotFound { ref value, .. } if value == "42");
}
