/*!
# Power Ledger

Back office for power-purchase agreements: a project register, a monthly
generation and payment sheet, and one billing ledger per project, served
over HTTP to the office dashboard.

## Overview

The office receives spreadsheets: a master list of generating projects, a
monthly report of generation and payments, and per-project meter ledgers.
This crate ingests them, keeps them in one store file, and answers the
dashboard's questions: how much capacity is contracted per category, how
much was generated each fiscal month, and what a project's next bill will
be given this month's meter readings.

Spreadsheet headers are written by people and drift from upload to upload.
Columns are therefore never addressed by fixed name; the [`columns`] module
finds them by keyword.

## Architecture

### Core (always built)
- **value**: `Record` rows and lenient numeric parsing
- **columns**: Keyword-driven column resolution
- **aggregate**: Category groups and the fiscal-year generation series
- **billing**: Meter-factor baseline and the bill formula
- **ledger**: In-place ledger editing with dependent-field recompute
- **store**: The gzip JSON store file, merges and the report join
- **stats**: Dashboard payment cards
- **view**: Dashboard navigation state
- **auth**: Employee roster checks and sign-in error wording

### Web layer (feature `web`)
- **ingest**: xlsx upload readers (calamine)
- **report**: xlsx report writer (rust_xlsxwriter)
- **charts**: PNG bar charts (plotters)
- **config**: Server flags and environment
- **app**: Routing and handlers (axum)

## Billing

```text
diff   = current - previous            (export and import separately)
kWh    = diff * MF
net    = export kWh - import kWh
bill   = round(net * rate)
```

The meter factor and rate of the next entry come from the most recent
ledger row with a positive numeric MF, and that row's current readings
become the previous readings.

## REST API Endpoints

- `GET /projects`, `/columns`, `/stats`, `/summary`
- `GET /history/{name}` - One project's ledger
- `POST /preview-reading` - Bill for proposed readings, nothing stored
- `POST /add-reading` - Append a server-billed ledger row
- `PUT /update-row` - Merge edits into a ledger row
- `POST /generate-report` - Joined xlsx report of chosen columns
- `GET /verify-employee/{id}` - Registration check
- `POST /upload-master`, `/append-data` - Spreadsheet uploads
- `GET /charts/generation.png`, `/charts/categories.png`
*/

pub mod aggregate;
pub mod auth;
pub mod billing;
pub mod columns;
pub mod ledger;
pub mod stats;
pub mod store;
pub mod value;
pub mod view;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod charts;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod ingest;
#[cfg(feature = "web")]
pub mod report;

pub use aggregate::{CategoryGroup, MonthlyGenerationPoint, Summary};
pub use billing::{BillBreakdown, BillInputs, MeterPair};
pub use ledger::{LedgerSession, RowSink};
pub use store::{DataStore, Sheet};
pub use value::Record;
