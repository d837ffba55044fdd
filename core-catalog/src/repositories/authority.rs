//! Authority and involvement repository

use crate::error::{CatalogError, Result};
use crate::models::{Authority, Involvement, InvolvementRow, Role};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Authority repository interface
///
/// The uncollected-works link is read-only here; it is written by the
/// uncollected-works maintainer.
#[async_trait]
pub trait AuthorityRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Authority>>;

    async fn insert(&self, authority: &Authority) -> Result<()>;

    /// Rename an authority
    async fn update(&self, authority: &Authority) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Authority whose uncollected-works collection is `collection_id`
    async fn find_by_uncollected_collection(&self, collection_id: &str) -> Result<Option<Authority>>;

    /// Credit an authority on a manifestation. Crediting twice in the same
    /// role is a no-op.
    async fn add_involvement(&self, involvement: &Involvement) -> Result<()>;

    async fn remove_involvement(
        &self,
        authority_id: &str,
        manifestation_id: &str,
        role: Role,
    ) -> Result<bool>;

    async fn involvements(&self, authority_id: &str) -> Result<Vec<Involvement>>;

    /// Distinct authorities credited on a manifestation, in any role
    async fn credited_authorities(&self, manifestation_id: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct SqliteAuthorityRepository {
    pool: SqlitePool,
}

impl SqliteAuthorityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorityRepository for SqliteAuthorityRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Authority>> {
        let authority = query_as::<_, Authority>("SELECT * FROM authorities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(authority)
    }

    async fn insert(&self, authority: &Authority) -> Result<()> {
        authority
            .validate()
            .map_err(|e| CatalogError::invalid("Authority", e))?;

        if authority.uncollected_works_collection_id.is_some() {
            return Err(CatalogError::invalid(
                "uncollected_works_collection_id",
                "assigned by the uncollected works maintainer",
            ));
        }

        query(
            "INSERT INTO authorities (id, name, lock_version, created_at, updated_at) \
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(&authority.id)
        .bind(&authority.name)
        .bind(authority.created_at)
        .bind(authority.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, authority: &Authority) -> Result<()> {
        authority
            .validate()
            .map_err(|e| CatalogError::invalid("Authority", e))?;

        let result = query("UPDATE authorities SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&authority.name)
            .bind(chrono::Utc::now().timestamp())
            .bind(&authority.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found("Authority", authority.id.as_str()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM authorities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_uncollected_collection(&self, collection_id: &str) -> Result<Option<Authority>> {
        let authority = query_as::<_, Authority>(
            "SELECT * FROM authorities WHERE uncollected_works_collection_id = ?",
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(authority)
    }

    async fn add_involvement(&self, involvement: &Involvement) -> Result<()> {
        query(
            "INSERT OR IGNORE INTO involvements (authority_id, manifestation_id, role, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&involvement.authority_id)
        .bind(&involvement.manifestation_id)
        .bind(involvement.role.as_str())
        .bind(involvement.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_involvement(
        &self,
        authority_id: &str,
        manifestation_id: &str,
        role: Role,
    ) -> Result<bool> {
        let result = query(
            "DELETE FROM involvements WHERE authority_id = ? AND manifestation_id = ? AND role = ?",
        )
        .bind(authority_id)
        .bind(manifestation_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn involvements(&self, authority_id: &str) -> Result<Vec<Involvement>> {
        let rows = query_as::<_, InvolvementRow>(
            "SELECT * FROM involvements WHERE authority_id = ? ORDER BY manifestation_id, role",
        )
        .bind(authority_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Involvement::try_from).collect()
    }

    async fn credited_authorities(&self, manifestation_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as(
            "SELECT DISTINCT authority_id FROM involvements WHERE manifestation_id = ? ORDER BY authority_id",
        )
        .bind(manifestation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Manifestation;
    use crate::repositories::{ManifestationRepository, SqliteManifestationRepository};

    #[tokio::test]
    async fn test_authority_crud() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteAuthorityRepository::new(pool);

        let mut authority = Authority::new("Anna Akhmatova");
        repo.insert(&authority).await.unwrap();

        authority.name = "A. Akhmatova".to_string();
        repo.update(&authority).await.unwrap();

        let found = repo.find_by_id(&authority.id).await.unwrap().unwrap();
        assert_eq!(found.name, "A. Akhmatova");
        assert_eq!(found.lock_version, 0);
        assert!(found.uncollected_works_collection_id.is_none());

        assert!(repo.delete(&authority.id).await.unwrap());
        assert!(repo.find_by_id(&authority.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_involvements() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteAuthorityRepository::new(pool.clone());
        let manifestations = SqliteManifestationRepository::new(pool);

        let authority = Authority::new("Translator");
        repo.insert(&authority).await.unwrap();
        let m = Manifestation::new("Poem");
        manifestations.insert(&m).await.unwrap();

        let involvement = Involvement::new(&authority.id, &m.id, Role::Translator);
        repo.add_involvement(&involvement).await.unwrap();
        repo.add_involvement(&involvement).await.unwrap();
        repo.add_involvement(&Involvement::new(&authority.id, &m.id, Role::Editor))
            .await
            .unwrap();

        let found = repo.involvements(&authority.id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(repo.credited_authorities(&m.id).await.unwrap(), vec![authority.id.clone()]);

        assert!(repo
            .remove_involvement(&authority.id, &m.id, Role::Editor)
            .await
            .unwrap());
        let found = repo.involvements(&authority.id).await.unwrap();
        assert_eq!(found, vec![involvement]);
    }
}
