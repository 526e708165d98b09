//! PostgreSQL test infrastructure.
//!
//! One container is started for the whole test run; every test gets its own database.

use std::sync::OnceLock;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Default credentials for testcontainers-modules postgres
const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_DB: &str = "postgres";

struct SharedPostgres {
    port: u16,
    // Keeps the container and the runtime that owns it alive for the test run
    _container: ContainerAsync<Postgres>,
    _runtime: tokio::runtime::Runtime,
}

static POSTGRES: OnceLock<SharedPostgres> = OnceLock::new();

fn shared_postgres() -> &'static SharedPostgres {
    POSTGRES.get_or_init(|| {
        let runtime = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
        let (container, port) = runtime.block_on(async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("failed to get postgres port");
            (container, port)
        });
        SharedPostgres {
            port,
            _container: container,
            _runtime: runtime,
        }
    })
}

fn url_with_db(db: &str) -> String {
    format!(
        "postgres://{}:{}@127.0.0.1:{}/{}",
        PG_USER,
        PG_PASSWORD,
        shared_postgres().port,
        db
    )
}

/// Create an empty database with a unique name and return its connection URL.
pub fn fresh_postgres_url() -> String {
    let mut admin =
        Client::connect(&url_with_db(PG_DB), NoTls).expect("failed to connect as admin");
    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .batch_execute(&format!("CREATE DATABASE \"{}\"", db_name))
        .expect("failed to create test database");
    url_with_db(&db_name)
}
