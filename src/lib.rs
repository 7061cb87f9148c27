// Dotação Form - Core Library
// Exposes all modules for use in the terminal form, the web server, and tests

pub mod error;
pub mod reference;      // Reference Data Loader
pub mod selector;       // Cascading Selector
pub mod currency;       // Currency Parser/Formatter
pub mod record;         // Record value type + row layout
pub mod ledger;         // Remote Ledger Client
pub mod credentials;    // Service-account auth
pub mod sheets;         // Google Sheets backend
pub mod config;
pub mod flow;           // Flow Controller (per-session state machine)
pub mod context;        // Startup wiring

// Re-export commonly used types
pub use error::{DotacaoError, Result};
pub use reference::{load as load_reference, ReferenceRow, ReferenceTable};
pub use selector::{budget_lines_for, sequential_codes_for, units_for, Selection};
pub use currency::{format_amount, parse_amount, AmountFormat};
pub use record::{format_date, header_row, parse_date, CellValue, Record, DATE_FORMAT, LEDGER_HEADERS};
pub use ledger::{
    ensure_sheet, BackendCall, MemoryBackend, RemoteLedger, SheetCapacity, SheetRef,
    SheetsBackend, SpreadsheetInfo,
};
pub use credentials::{ServiceAccountAuth, ServiceAccountKey, SCOPES};
pub use sheets::GoogleSheets;
pub use config::{AppConfig, LedgerConfig};
pub use flow::{Feedback, Field, FlowState, Session};
pub use context::{startup_report, AppContext};

use std::sync::Once;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static TRACING_INIT: Once = Once::new();

/// Install the global tracing subscriber once.
///
/// `RUST_LOG` wins; otherwise `default_directive` (e.g. `dotacao_form=info`).
pub fn init_tracing(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    });
}
