mod common;

use common::TestEnv;
use graphboard::db::models::{UserInput, UserUpdate};

fn sign_up_input(email: &str) -> UserInput {
    UserInput {
        username: "Test User".into(),
        email: email.into(),
        password: "Secret123".into(),
    }
}

#[tokio::test]
async fn sign_up_then_sign_in() {
    let env = TestEnv::new();
    let users = env.uow().users;

    let payload = env
        .state
        .auth
        .sign_up(sign_up_input("Test@Test.com"), &users)
        .await
        .unwrap();
    assert_eq!(payload.user.email, "test@test.com");
    assert_ne!(payload.user.password_hash, "Secret123");
    assert!(!payload.token.is_empty());

    let signed_in = env
        .state
        .auth
        .authenticate_user("Secret123", "TEST@test.com", &users)
        .await
        .unwrap()
        .expect("credentials should match");
    assert_eq!(signed_in.user.id, payload.user.id);
}

#[tokio::test]
async fn wrong_credentials_are_anonymous() {
    let env = TestEnv::new();
    let users = env.uow().users;
    env.state
        .auth
        .sign_up(sign_up_input("test@test.com"), &users)
        .await
        .unwrap();

    let wrong_password = env
        .state
        .auth
        .authenticate_user("Wrong1234", "test@test.com", &users)
        .await
        .unwrap();
    assert!(wrong_password.is_none());

    let unknown = env
        .state
        .auth
        .authenticate_user("Secret123", "nobody@test.com", &users)
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn token_resolves_to_its_user() {
    let env = TestEnv::new();
    let payload = env
        .state
        .auth
        .sign_up(sign_up_input("test@test.com"), &env.uow().users)
        .await
        .unwrap();

    let users = env.uow().users;
    let bearer = format!("Bearer {}", payload.token);
    let user = env
        .state
        .auth
        .verify_token(Some(&bearer), &users)
        .await
        .unwrap()
        .expect("token should resolve");
    assert_eq!(user.id, payload.user.id);

    let bare = env
        .state
        .auth
        .verify_token(Some(&payload.token), &users)
        .await
        .unwrap();
    assert!(bare.is_some());

    for bad in [None, Some(""), Some("Bearer "), Some("not.a.jwt")] {
        assert!(env.state.auth.verify_token(bad, &users).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn sign_up_rejects_duplicates_and_bad_fields() {
    let env = TestEnv::new();
    let users = env.uow().users;
    users.create_user(sign_up_input("test@test.com")).await.unwrap();

    let err = users
        .create_user(sign_up_input(" TEST@test.com "))
        .await
        .unwrap_err();
    assert_eq!(
        err.as_validation().unwrap().messages("email"),
        Some(&["Email address is already in use.".to_string()][..])
    );

    let err = users
        .create_user(UserInput {
            username: "!".into(),
            email: "not-an-email".into(),
            password: "short".into(),
        })
        .await
        .unwrap_err();
    let mut keys: Vec<_> = err.as_validation().unwrap().keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["email", "password", "username"]);
}

#[tokio::test]
async fn users_update_only_themselves() {
    let env = TestEnv::new();
    let me = env.user("Me Myself", "me@test.com").await;
    let other = env.user("Someone", "someone@test.com").await;
    let users = env.uow().users;

    let err = users
        .update_user(
            &other.id.to_hex(),
            UserUpdate {
                username: Some("Hijacked".into()),
                ..Default::default()
            },
            Some(&me),
        )
        .await
        .unwrap_err();
    assert!(err.as_validation().unwrap().has_key("user"));

    let err = users
        .update_user(
            &me.id.to_hex(),
            UserUpdate {
                email: Some("someone@test.com".into()),
                ..Default::default()
            },
            Some(&me),
        )
        .await
        .unwrap_err();
    assert!(err.as_validation().unwrap().has_key("email"));

    let err = users
        .update_user(&me.id.to_hex(), UserUpdate::default(), Some(&me))
        .await
        .unwrap_err();
    assert!(err.as_validation().unwrap().has_key("input"));

    let updated = users
        .update_user(
            &me.id.to_hex(),
            UserUpdate {
                username: Some("New Name".into()),
                password: Some("Another123".into()),
                ..Default::default()
            },
            Some(&me),
        )
        .await
        .unwrap();
    assert_eq!(updated.username, "New Name");
    assert!(updated.updated_at > updated.created_at);

    let signed_in = env
        .state
        .auth
        .authenticate_user("Another123", "me@test.com", &users)
        .await
        .unwrap();
    assert!(signed_in.is_some());
}
