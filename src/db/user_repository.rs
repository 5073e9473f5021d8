use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{doc, DateTime};

use crate::auth::password::PasswordHasher;
use crate::db::collection::Collection;
use crate::db::filter::UserFilter;
use crate::db::loader::Loaders;
use crate::db::models::{update_timestamp, User, UserInput, UserUpdate};
use crate::db::query::{list, ListArgs};
use crate::error::AppError;
use crate::events::{ChangeAction, EventBus, Topic};
use crate::validation::{
    ensure, is_blank, is_valid_email, is_valid_password, is_valid_username, require,
    ValidationError, Violations,
};

pub const SORTABLE: &[&str] = &["createdAt", "updatedAt"];

const USERNAME_POLICY: &str =
    "Username must be 3 to 32 letters, digits, spaces, dots, dashes or underscores.";
const PASSWORD_POLICY: &str =
    "Password must be 8 to 72 characters and contain a letter and a digit.";

/// Emails are stored and compared trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct UserRepository {
    collection: Arc<dyn Collection<User>>,
    loaders: Arc<Loaders>,
    events: EventBus,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserRepository {
    pub fn new(
        collection: Arc<dyn Collection<User>>,
        loaders: Arc<Loaders>,
        events: EventBus,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            collection,
            loaders,
            events,
            hasher,
        }
    }

    fn check_username(violations: &mut Violations, username: &str) {
        if is_blank(Some(username)) {
            violations.push("username", "Username is required.");
        } else if !is_valid_username(username.trim()) {
            violations.push("username", USERNAME_POLICY);
        }
    }

    async fn check_email(
        &self,
        violations: &mut Violations,
        email: &str,
        owner: Option<ObjectId>,
    ) -> Result<(), AppError> {
        if is_blank(Some(email)) {
            violations.push("email", "Email is required.");
        } else if !is_valid_email(email) {
            violations.push("email", "Email address is invalid.");
        } else if let Some(existing) = self.find_by_email(email).await? {
            violations.check(
                Some(existing.id) != owner,
                "email",
                "Email address is already in use.",
            );
        }
        Ok(())
    }

    fn check_password(violations: &mut Violations, password: &str) {
        if password.is_empty() {
            violations.push("password", "Password is required.");
        } else if !is_valid_password(password) {
            violations.push("password", PASSWORD_POLICY);
        }
    }

    /// Sign-up. Does not require an authenticated actor.
    pub async fn create_user(&self, input: UserInput) -> Result<User, AppError> {
        let mut violations = Violations::new();
        Self::check_username(&mut violations, &input.username);
        self.check_email(&mut violations, &input.email, None).await?;
        Self::check_password(&mut violations, &input.password);

        if let Err(err) = violations.finish() {
            tracing::warn!(keys = ?err.keys().collect::<Vec<_>>(), "Rejected sign-up");
            return Err(err.into());
        }

        let now = DateTime::now();
        let user = User {
            id: ObjectId::new(),
            username: input.username.trim().to_string(),
            email: normalize_email(&input.email),
            password_hash: self.hasher.hash(&input.password).await?,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };

        self.collection.insert_one(&user).await?;
        self.loaders.users.prime(&user).await;
        self.events.publish(Topic::User, ChangeAction::Created, user.id);
        tracing::info!(entity = "users", id = %user.id, "User created");

        Ok(user)
    }

    /// Users may only change their own account.
    pub async fn update_user(
        &self,
        id: &str,
        input: UserUpdate,
        actor: Option<&User>,
    ) -> Result<User, AppError> {
        let actor = require(actor, "user", "Authentication required.")?;
        let mut user = require(
            self.loaders.users.load(Some(id)).await?,
            "id",
            "User not found.",
        )?;
        ensure(user.id == actor.id, "user", "You can only update your own account.")?;

        let username = input
            .username
            .as_deref()
            .filter(|u| u.trim() != user.username);
        let email = input
            .email
            .as_deref()
            .filter(|e| normalize_email(e) != user.email);
        let password = match input.password.as_deref() {
            Some(password) if self.hasher.verify(password, &user.password_hash).await? => None,
            other => other,
        };
        if username.is_none() && email.is_none() && password.is_none() {
            return Err(ValidationError::single("input", "No changes to apply.").into());
        }

        let mut violations = Violations::new();
        if let Some(username) = username {
            Self::check_username(&mut violations, username);
        }
        if let Some(email) = email {
            self.check_email(&mut violations, email, Some(user.id)).await?;
        }
        if let Some(password) = password {
            Self::check_password(&mut violations, password);
        }
        if let Err(err) = violations.finish() {
            tracing::warn!(id = %user.id, keys = ?err.keys().collect::<Vec<_>>(), "Rejected user update");
            return Err(err.into());
        }

        if let Some(username) = username {
            user.username = username.trim().to_string();
        }
        if let Some(email) = email {
            user.email = normalize_email(email);
            user.email_verified = false;
        }
        if let Some(password) = password {
            user.password_hash = self.hasher.hash(password).await?;
        }
        user.updated_at = update_timestamp(Some(user.created_at));

        self.collection.replace_one(user.id, &user).await?;
        self.loaders.users.prime(&user).await;
        self.events.publish(Topic::User, ChangeAction::Updated, user.id);
        tracing::info!(entity = "users", id = %user.id, "User updated");

        Ok(user)
    }

    pub async fn all_users(
        &self,
        filter: Option<&UserFilter>,
        order_by: Option<&str>,
        skip: Option<i64>,
        first: Option<i64>,
    ) -> Result<Vec<User>, AppError> {
        list(
            self.collection.as_ref(),
            filter,
            ListArgs::new(order_by, skip, first),
            SORTABLE,
        )
        .await
    }

    pub async fn get_user_by_id(&self, id: Option<&str>) -> Result<Option<User>, AppError> {
        self.loaders.users.load(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = self
            .collection
            .find_one(doc! { "email": normalize_email(email) })
            .await?;
        if let Some(user) = &user {
            self.loaders.users.prime(user).await;
        }
        Ok(user)
    }
}
