//! MySQL test infrastructure.
//!
//! One container is started for the whole test run; every test gets its own database.

use std::sync::OnceLock;

use mysql::prelude::Queryable;
use mysql::{Conn, Opts};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mysql::Mysql;
use uuid::Uuid;

struct SharedMysql {
    port: u16,
    // Keeps the container and the runtime that owns it alive for the test run
    _container: ContainerAsync<Mysql>,
    _runtime: tokio::runtime::Runtime,
}

static MYSQL: OnceLock<SharedMysql> = OnceLock::new();

fn shared_mysql() -> &'static SharedMysql {
    MYSQL.get_or_init(|| {
        let runtime = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
        let (container, port) = runtime.block_on(async {
            let container = Mysql::default()
                .start()
                .await
                .expect("failed to start mysql container");
            let port = container
                .get_host_port_ipv4(3306)
                .await
                .expect("failed to get mysql port");
            (container, port)
        });
        SharedMysql {
            port,
            _container: container,
            _runtime: runtime,
        }
    })
}

/// Get the base MySQL connection URL for the shared container.
fn mysql_base_url() -> String {
    format!("mysql://root@127.0.0.1:{}", shared_mysql().port)
}

/// Create an empty utf8mb4 database with a unique name and return its connection URL.
pub fn fresh_mysql_url() -> String {
    let admin_url = format!("{}/test", mysql_base_url());
    let mut admin =
        Conn::new(Opts::from_url(&admin_url).expect("parse admin url")).expect("failed to connect as admin");
    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .query_drop(format!(
            "CREATE DATABASE `{}` CHARACTER SET utf8mb4",
            db_name
        ))
        .expect("failed to create test database");
    format!("{}/{}", mysql_base_url(), db_name)
}
