use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use tracing::{debug, warn};

use crate::entities::product_master::{
    ActiveModel as MasterActiveModel, Column, Entity as ProductMaster, Model as MasterModel,
};
use crate::errors::ServiceError;
use crate::models::ProductUpsert;

/// Outcome of [`ProductMasterRepository::upsert`].
#[derive(Debug, Clone)]
pub struct MasterUpsert {
    pub product: MasterModel,
    /// True when this call inserted the row
    pub created: bool,
}

/// Repository for the product master
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductMasterRepository;

impl ProductMasterRepository {
    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        reference_code: &str,
    ) -> Result<Option<MasterModel>, ServiceError> {
        Ok(ProductMaster::find_by_id(reference_code.to_string())
            .one(conn)
            .await?)
    }

    pub async fn get<C: ConnectionTrait>(
        conn: &C,
        reference_code: &str,
    ) -> Result<MasterModel, ServiceError> {
        Self::find(conn, reference_code).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} not found", reference_code))
        })
    }

    /// `INSERT .. ON CONFLICT (reference_code) DO NOTHING`. Returns false when
    /// the row already existed, including when a concurrent writer won.
    pub async fn insert_if_absent<C: ConnectionTrait>(
        conn: &C,
        incoming: &ProductUpsert,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let row = MasterActiveModel {
            reference_code: Set(incoming.reference_code.clone()),
            ean: Set(incoming.ean.clone()),
            description: Set(incoming.description.clone()),
            size: Set(incoming.size.clone()),
            colour: Set(incoming.colour.clone()),
            family: Set(incoming.family.clone()),
            brand: Set(incoming.brand.clone()),
            season: Set(incoming.season.clone()),
            material: Set(incoming.material.clone()),
            quantity_on_hand: Set(incoming.quantity_on_hand),
            unit_cost: Set(incoming.unit_cost),
            retail_price: Set(incoming.retail_price),
            outlet_price: Set(incoming.outlet_price),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = ProductMaster::insert(row)
            .on_conflict(
                OnConflict::column(Column::ReferenceCode)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(inserted > 0)
    }

    /// Copies every non-`None` incoming field onto `existing`.
    pub async fn merge<C: ConnectionTrait>(
        conn: &C,
        existing: MasterModel,
        incoming: &ProductUpsert,
    ) -> Result<MasterModel, ServiceError> {
        let mut active: MasterActiveModel = existing.into();
        macro_rules! merge_fields {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = incoming.$field.clone() {
                        active.$field = Set(Some(value));
                    }
                )*
            };
        }
        merge_fields!(
            ean,
            description,
            size,
            colour,
            family,
            brand,
            season,
            material,
            quantity_on_hand,
            unit_cost,
            retail_price,
            outlet_price,
        );
        Ok(active.update(conn).await?)
    }

    /// Creates the row for `incoming.reference_code` or merges into it.
    ///
    /// One conditional insert decides who creates the row; the loser of a
    /// concurrent race lands on the merge path instead of failing.
    pub async fn upsert<C: ConnectionTrait>(
        conn: &C,
        incoming: &ProductUpsert,
    ) -> Result<MasterUpsert, ServiceError> {
        if Self::insert_if_absent(conn, incoming).await? {
            debug!(reference_code = %incoming.reference_code, "Created product master row");
            let product = Self::get(conn, &incoming.reference_code).await?;
            return Ok(MasterUpsert {
                product,
                created: true,
            });
        }

        let existing = Self::get(conn, &incoming.reference_code).await?;
        let product = Self::merge(conn, existing, incoming).await?;
        Ok(MasterUpsert {
            product,
            created: false,
        })
    }

    /// Upsert for a code whose row was absent when the caller looked. Logs
    /// when another writer created it in between.
    pub async fn upsert_expecting_new<C: ConnectionTrait>(
        conn: &C,
        incoming: &ProductUpsert,
    ) -> Result<MasterUpsert, ServiceError> {
        let outcome = Self::upsert(conn, incoming).await?;
        if !outcome.created {
            warn!(
                reference_code = %incoming.reference_code,
                "Product master row created concurrently; merged instead"
            );
        }
        Ok(outcome)
    }
}
