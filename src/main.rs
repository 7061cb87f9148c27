// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use std::env;
use std::path::Path;

// Use library instead of local modules
use dotacao_form::{init_tracing, startup_report, AppConfig, AppContext, DotacaoError, ServiceAccountKey};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("secrets") => run_secrets(args.get(2).map(String::as_str))?,
        Some("check") => run_check()?,
        _ => run_ui_mode()?,
    }

    Ok(())
}

/// Print a service-account key as a `[gcp_service_account]` config section
fn run_secrets(path: Option<&str>) -> Result<()> {
    let path = Path::new(path.unwrap_or("credentials.json"));
    let key = ServiceAccountKey::from_json_file(path)?;

    println!("# Cole no dotacao.toml");
    println!("{}", key.to_secrets_toml()?);
    Ok(())
}

fn run_check() -> Result<()> {
    init_tracing("dotacao_form=info");

    println!("🔍 Dotação Form - verificação");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_config();
    let runtime = tokio::runtime::Runtime::new()?;
    let ctx = connect_or_exit(&runtime, config);

    println!("✓ {} órgãos carregados", ctx.table.distinct_units().len());
    println!("✓ {} linhas de referência", ctx.table.len());
    println!("✅ Conectado à planilha: {}", ctx.spreadsheet_title());

    Ok(())
}

fn load_config() -> AppConfig {
    let path = AppConfig::default_path();
    match AppConfig::load(&path) {
        Ok(config) => config,
        Err(e) => exit_with(&e, &AppConfig::default()),
    }
}

fn exit_with(err: &DotacaoError, config: &AppConfig) -> ! {
    for line in startup_report(err, &AppConfig::default_path(), config) {
        eprintln!("{}", line);
    }
    std::process::exit(1);
}

/// Startup failures are fatal: print the cause plus what to do about it.
fn connect_or_exit(runtime: &tokio::runtime::Runtime, config: AppConfig) -> AppContext {
    let report_config = config.clone();

    match runtime.block_on(AppContext::connect(config)) {
        Ok(ctx) => ctx,
        Err(e) => exit_with(&e, &report_config),
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode() -> Result<()> {
    // Log lines would paint over the alternate screen
    init_tracing("off");

    println!("🖥️  Carregando Disponibilização de Dotação...\n");

    let config = load_config();
    let runtime = tokio::runtime::Runtime::new()?;
    let ctx = connect_or_exit(&runtime, config);

    println!("✓ Conectado à planilha: {}", ctx.spreadsheet_title());
    println!("Iniciando formulário... (Esc para sair)\n");

    // Create and run app
    let mut app = ui::App::new(ctx.new_session(), ctx.spreadsheet_title());
    ui::run_ui(&mut app, ctx.ledger.as_ref(), &runtime)?;

    println!("\n✅ Formulário encerrado");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode() -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web UI: cargo run --bin dotacao-server --features server");
    std::process::exit(1);
}
