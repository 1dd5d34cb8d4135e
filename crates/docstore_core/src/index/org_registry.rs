//! Organization registry backed by SQLite.
//!
//! Organizations are global: every namespace resolves `org` and `orgID`
//! against the same table.

use crate::index::sqlite::parse_org_id;
use crate::model::org::{OrgId, Organization};
use crate::store::{StoreError, StoreResult};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};

/// Registers and looks up organizations.
pub struct SqliteOrganizationRegistry<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOrganizationRegistry<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Registers a new organization under a unique, trimmed name.
    pub fn create_organization(&self, name: &str) -> StoreResult<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidRequest(
                "organization name must not be blank".to_string(),
            ));
        }

        let organization = Organization {
            id: OrgId::new(),
            name: name.to_string(),
        };
        match self.conn.execute(
            "INSERT INTO organizations (id, name) VALUES (?1, ?2);",
            [organization.id.to_string(), organization.name.clone()],
        ) {
            Ok(_) => Ok(organization),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::InvalidRequest(format!(
                    "organization name `{name}` is already taken"
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_organization(&self, id: OrgId) -> StoreResult<Option<Organization>> {
        self.conn
            .query_row(
                "SELECT id, name FROM organizations WHERE id = ?1;",
                [id.to_string()],
                parse_organization_columns,
            )
            .optional()?
            .map(into_organization)
            .transpose()
    }

    pub fn find_organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>> {
        self.conn
            .query_row(
                "SELECT id, name FROM organizations WHERE name = ?1;",
                [name],
                parse_organization_columns,
            )
            .optional()?
            .map(into_organization)
            .transpose()
    }

    /// Lists organizations sorted by name.
    pub fn list_organizations(&self) -> StoreResult<Vec<Organization>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM organizations ORDER BY name ASC;")?;
        let mut rows = stmt.query([])?;
        let mut organizations = Vec::new();
        while let Some(row) = rows.next()? {
            organizations.push(into_organization(parse_organization_columns(row)?)?);
        }
        Ok(organizations)
    }
}

fn parse_organization_columns(row: &Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn into_organization((id_text, name): (String, String)) -> StoreResult<Organization> {
    Ok(Organization {
        id: parse_org_id(&id_text)?,
        name,
    })
}
