use crate::models::{Bill, Contractor, JobOpsMaster, Operation, WorkDone};
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

pub const BILLS_COLLECTION: &str = "bills";
pub const JOB_OPS_COLLECTION: &str = "jobopsmasters";
pub const WORK_DONE_COLLECTION: &str = "contractorworkdones";
pub const OPERATIONS_COLLECTION: &str = "operations";
pub const CONTRACTORS_COLLECTION: &str = "contractors";

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for contractor-billing-service");

        create_index(
            &self.bills(),
            BILLS_COLLECTION,
            doc! { "billNumber": 1 },
            "bill_number_unique",
            true,
        )
        .await?;

        create_index(
            &self.job_ops(),
            JOB_OPS_COLLECTION,
            doc! { "jobId": 1 },
            "job_id_unique",
            true,
        )
        .await?;

        create_index(
            &self.work_done(),
            WORK_DONE_COLLECTION,
            doc! { "contractorId": 1, "jobId": 1 },
            "contractor_job_unique",
            true,
        )
        .await?;

        create_index(
            &self.operations(),
            OPERATIONS_COLLECTION,
            doc! { "name": 1 },
            "operation_name_lookup",
            false,
        )
        .await?;

        create_index(
            &self.contractors(),
            CONTRACTORS_COLLECTION,
            doc! { "name": 1 },
            "contractor_name_lookup",
            false,
        )
        .await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn bills(&self) -> Collection<Bill> {
        self.db.collection(BILLS_COLLECTION)
    }

    pub fn job_ops(&self) -> Collection<JobOpsMaster> {
        self.db.collection(JOB_OPS_COLLECTION)
    }

    pub fn work_done(&self) -> Collection<WorkDone> {
        self.db.collection(WORK_DONE_COLLECTION)
    }

    pub fn operations(&self) -> Collection<Operation> {
        self.db.collection(OPERATIONS_COLLECTION)
    }

    pub fn contractors(&self) -> Collection<Contractor> {
        self.db.collection(CONTRACTORS_COLLECTION)
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }
}

async fn create_index<T>(
    collection: &Collection<T>,
    collection_name: &str,
    keys: Document,
    name: &str,
    unique: bool,
) -> Result<(), AppError>
where
    T: Send + Sync,
{
    let index = IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build();

    collection.create_index(index, None).await.map_err(|e| {
        tracing::error!(
            "Failed to create {} index on {} collection: {}",
            name,
            collection_name,
            e
        );
        AppError::from(e)
    })?;
    tracing::info!(index = %name, collection = %collection_name, "Created index");
    Ok(())
}
