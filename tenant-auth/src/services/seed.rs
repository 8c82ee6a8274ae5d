use crate::models::{Role, Tenant, User, UserTenantRole};
use crate::repositories::Repositories;
use crate::services::{AuthError, PasswordService};

pub const DEMO_TENANT_SLUG: &str = "demo";
pub const DEMO_PASSWORD: &str = "DemoPass1";

const DEMO_USERS: [(&str, &str, Role); 3] = [
    ("owner@demo.local", "Olivia", Role::Owner),
    ("manager@demo.local", "Marco", Role::Manager),
    ("waiter@demo.local", "Wendy", Role::Waiter),
];

/// Development data for runs without a database. Skipped if the demo tenant exists.
pub async fn seed_demo_data(
    repos: &Repositories,
    passwords: &PasswordService,
) -> Result<(), AuthError> {
    if repos.tenants.exists_by_slug(DEMO_TENANT_SLUG).await? {
        return Ok(());
    }

    let tenant = Tenant::new("Demo Restaurant", DEMO_TENANT_SLUG);
    repos.tenants.create(&tenant).await?;

    for (email, first_name, role) in DEMO_USERS {
        let mut user = User::new(
            email,
            passwords.hash(DEMO_PASSWORD)?,
            first_name.to_string(),
            "Demo".to_string(),
        );
        user.must_reset_password = false;
        repos.users.create(&user).await?;
        repos
            .roles
            .create(&UserTenantRole::new(user.id, tenant.id, role))
            .await?;
    }

    tracing::info!(
        tenant_id = %tenant.id,
        users = DEMO_USERS.len(),
        "Seeded demo tenant"
    );
    Ok(())
}
