//! # Seed Data Generator
//!
//! Populates a database with a demo branch for development.
//!
//! ## Usage
//! ```bash
//! # Seed tenant "demo", branch "main"
//! cargo run -p shiftline-db --bin seed
//!
//! # Specify database path and scope
//! cargo run -p shiftline-db --bin seed -- --db ./data/shiftline.db --tenant acme --branch north
//! ```
//!
//! ## Generated Data
//! - A menu across a few categories
//! - Delivery zones with distinct fees
//! - One customer per zone
//! - A handful of couriers, all OUT

use shiftline_core::{Courier, CourierStatus, Customer, Product, Zone};
use shiftline_db::{Database, DbConfig};
use std::env;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// (category, [(name, price_cents)])
const MENU: &[(&str, &[(&str, i64)])] = &[
    (
        "Pizza",
        &[
            ("Margherita", 2400),
            ("Pepperoni", 2900),
            ("Four Cheese", 3100),
            ("Vegetable", 2600),
        ],
    ),
    (
        "Burgers",
        &[
            ("Classic Burger", 1900),
            ("Cheese Burger", 2100),
            ("Chicken Burger", 2000),
        ],
    ),
    (
        "Sides",
        &[("Fries", 700), ("Onion Rings", 800), ("Coleslaw", 500)],
    ),
    (
        "Drinks",
        &[("Cola", 450), ("Lemonade", 500), ("Water", 300)],
    ),
];

/// (name, delivery_fee_cents)
const ZONES: &[(&str, i64)] = &[
    ("Downtown", 1000),
    ("Riverside", 1500),
    ("Hillside", 2000),
];

const COURIERS: &[&str] = &["Sam", "Noor", "Alex", "Rami"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./shiftline_dev.db");
    let mut tenant_id = String::from("demo");
    let mut branch_id = String::from("main");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" if i + 1 < args.len() => {
                db_path = args[i + 1].clone();
                i += 1;
            }
            "--tenant" | "-t" if i + 1 < args.len() => {
                tenant_id = args[i + 1].clone();
                i += 1;
            }
            "--branch" | "-b" if i + 1 < args.len() => {
                branch_id = args[i + 1].clone();
                i += 1;
            }
            "--help" | "-h" => {
                println!("Shiftline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./shiftline_dev.db)");
                println!("  -t, --tenant <ID>    Tenant id (default: demo)");
                println!("  -b, --branch <ID>    Branch id (default: main)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Shiftline Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Scope:    {}/{}", tenant_id, branch_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let catalog = db.catalog();

    let existing = catalog.product_count(&tenant_id, &branch_id).await?;
    if existing > 0 {
        println!("Branch already has {} products, skipping seed.", existing);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let mut products = 0;
    for (category, items) in MENU {
        for (name, price_cents) in items.iter() {
            catalog
                .insert_product(&Product {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant_id.clone(),
                    branch_id: branch_id.clone(),
                    name: name.to_string(),
                    category: Some(category.to_string()),
                    price_cents: *price_cents,
                    is_active: true,
                })
                .await?;
            products += 1;
        }
    }
    println!("Products:  {}", products);

    for (idx, (name, fee)) in ZONES.iter().enumerate() {
        let zone_id = Uuid::new_v4().to_string();
        catalog
            .insert_zone(&Zone {
                id: zone_id.clone(),
                tenant_id: tenant_id.clone(),
                branch_id: branch_id.clone(),
                name: name.to_string(),
                delivery_fee_cents: *fee,
            })
            .await?;
        catalog
            .insert_customer(&Customer {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.clone(),
                branch_id: Some(branch_id.clone()),
                name: format!("{} Customer", name),
                address: Some(format!("{} {} Street", idx + 1, name)),
                phone1: format!("555-01{:02}", idx),
                phone2: None,
                zone_id: Some(zone_id),
            })
            .await?;
    }
    println!("Zones:     {}", ZONES.len());
    println!("Customers: {}", ZONES.len());

    for name in COURIERS {
        db.couriers()
            .insert(&Courier {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.clone(),
                branch_id: branch_id.clone(),
                name: name.to_string(),
                phone: None,
                status: CourierStatus::Out,
                busy_since: None,
                is_active: true,
            })
            .await?;
    }
    println!("Couriers:  {}", COURIERS.len());

    db.close().await;
    println!();
    println!("Done.");
    Ok(())
}
