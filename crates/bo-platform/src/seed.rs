//! Development Data Seeder
//!
//! Seeds roles, accounts and a permission matrix for local use.
//!
//! Default credentials (password `DevPassword123!`):
//!   admin  - SuperAdmin, every policy
//!   editor - Editor, Department View/Create/Edit
//!   viewer - Viewer, Department View

use tracing::info;

use crate::app::{Backend, Platform};
use crate::auth::{Argon2Config, PasswordService, RoleRef, UserAccount};
use crate::data::{Filter, GenericService};
use crate::permission::{Permission, RolePermission};
use crate::shared::error::Result;

pub const DEV_PASSWORD: &str = "DevPassword123!";

struct SeedUser {
    id: &'static str,
    username: &'static str,
    email: &'static str,
    role: (i64, &'static str),
}

const ROLES: &[(i64, &str, &str)] = &[
    (1, "SuperAdmin", "Super administrator"),
    (2, "Editor", "Department editor"),
    (3, "Viewer", "Read-only user"),
];

const USERS: &[SeedUser] = &[
    SeedUser { id: "0000000000001", username: "admin", email: "admin@backoffice.local", role: (1, "SuperAdmin") },
    SeedUser { id: "0000000000002", username: "editor", email: "editor@backoffice.local", role: (2, "Editor") },
    SeedUser { id: "0000000000003", username: "viewer", email: "viewer@backoffice.local", role: (3, "Viewer") },
];

pub struct DevDataSeeder<'a> {
    platform: &'a Platform,
    passwords: PasswordService,
}

impl<'a> DevDataSeeder<'a> {
    pub fn new(platform: &'a Platform) -> Self {
        Self {
            platform,
            passwords: PasswordService::new(Argon2Config::testing()),
        }
    }

    pub async fn seed(&self) -> Result<()> {
        info!("Seeding development data...");

        self.seed_accounts().await?;
        self.seed_role_permissions().await?;

        info!("Development data seeded");
        for user in USERS {
            info!("  {} / {} ({})", user.username, DEV_PASSWORD, user.role.1);
        }
        Ok(())
    }

    async fn seed_accounts(&self) -> Result<()> {
        let password_hash = self.passwords.hash_password(DEV_PASSWORD)?;

        match self.platform.storage.backend() {
            Backend::Memory { users } => {
                for user in USERS {
                    users.insert(
                        UserAccount::new(user.id, user.username, password_hash.clone())
                            .with_email(user.email)
                            .with_role(RoleRef::new(user.role.0, user.role.1)),
                    );
                }
            }
            Backend::Postgres(pool) => {
                for &(id, code, name) in ROLES {
                    sqlx::query(r#"INSERT INTO "roles" ("id", "code", "name") VALUES ($1, $2, $3) ON CONFLICT DO NOTHING"#)
                        .bind(id)
                        .bind(code)
                        .bind(name)
                        .execute(pool)
                        .await?;
                }
                sqlx::query(r#"SELECT setval(pg_get_serial_sequence('roles', 'id'), (SELECT MAX("id") FROM "roles"))"#)
                    .execute(pool)
                    .await?;

                for user in USERS {
                    sqlx::query(
                        r#"INSERT INTO "users" ("id", "username", "email", "password_hash")
                           VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING"#,
                    )
                    .bind(user.id)
                    .bind(user.username)
                    .bind(user.email)
                    .bind(&password_hash)
                    .execute(pool)
                    .await?;

                    sqlx::query(r#"INSERT INTO "user_roles" ("user_id", "role_id") VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
                        .bind(user.id)
                        .bind(user.role.0)
                        .execute(pool)
                        .await?;
                }
            }
        }

        info!(accounts = USERS.len(), "Seeded accounts");
        Ok(())
    }

    async fn seed_role_permissions(&self) -> Result<()> {
        let service: GenericService<RolePermission> = self.platform.service();
        let grants = [
            (2, "Editor", "Department", Permission::VIEW | Permission::CREATE | Permission::EDIT),
            (2, "Editor", "RolePermission", Permission::VIEW),
            (3, "Viewer", "Department", Permission::VIEW),
        ];

        for (role_id, role_code, module, permission) in grants {
            let existing = RolePermission::ROLE_ID
                .eq(role_id)
                .and(RolePermission::MODULE.eq(module))
                .and(Filter::not_deleted());
            let found: Option<RolePermission> = service.get_single(&existing).await?;
            if found.is_none() {
                service
                    .create(RolePermission::new(role_id, role_code, module, permission), Some("Seeder"))
                    .await?;
            }
        }
        Ok(())
    }
}
