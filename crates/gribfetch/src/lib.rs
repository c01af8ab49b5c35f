//! Locate, inventory, and subset NWP GRIB2 files across archive
//! mirrors.
//!
//! Given a model, a cycle, and a lead time, the engine finds the GRIB2
//! file on a prioritized set of mirrors, reads the companion index file
//! to learn per-message byte ranges, and downloads either the whole
//! file or just the messages matching a search regex, caching results
//! on disk.
//!
//! ```no_run
//! use gribfetch::{Fetcher, Request};
//! use chrono::{TimeZone, Utc};
//!
//! # async fn demo() -> gribfetch::Result<()> {
//! let fetcher = Fetcher::new()?;
//! let req = Request::builder("hrrr")
//!     .product("sfc")
//!     .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
//!     .build()?;
//!
//! let inventory = fetcher.inventory(&req, Some(":TMP:2 m")).await?;
//! let path = fetcher.download(&req, Some(":TMP:2 m")).await?;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod help;
pub mod inventory;
pub mod models;
pub mod paths;
pub mod probe;
pub mod request;
pub mod resolver;
pub mod subset;
pub mod wgrib2;

pub use config::AppConfig;
pub use error::{FetchError, Result};
pub use fetcher::{ErrorPolicy, Fetcher};
pub use inventory::{Inventory, InventoryRecord, MessageAttrs};
pub use models::{Evaluated, IdxDialect, Registry, Template};
pub use request::{parse_lead, Member, Request, RequestBuilder};
pub use resolver::{Location, Resolved};
