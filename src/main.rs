use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::error;

use emmo_ingest::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::{invoice, invoice_line, InvoiceStatus, ReferenceOrigin},
    models::{IngestOutcome, InvoiceFilter, InvoiceHeader, NewLine, ProductUpsert},
    services::{
        extraction::PreparsedExtractor, DocumentExtractor, DocumentUpload, ExtractedDocument,
        IngestionService, StubExtractor,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;
    let json = cli.json;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Ingest(args) => handle_ingest(&context, args, json).await?,
        Commands::AddLine(args) => handle_add_line(&context, args, json).await?,
        Commands::SetReference(args) => handle_set_reference(&context, args, json).await?,
        Commands::Process(args) => handle_process(&context, args, json).await?,
        Commands::Reprocess(args) => handle_reprocess(&context, args, json).await?,
        Commands::Status(args) => handle_status(&context, args, json).await?,
        Commands::List(args) => handle_list(&context, args, json).await?,
        Commands::Show(args) => handle_show(&context, args, json).await?,
        Commands::UpsertProduct(args) => handle_upsert_product(&context, args, json).await?,
        Commands::Product(args) => handle_product(&context, args, json).await?,
        Commands::Export(args) => handle_export(&context, args, json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "emmo-ingest",
    about = "Ingest OCR-extracted supplier invoices and check line prices",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Ingest an invoice header and lines from a JSON payload
    Ingest(PayloadArgs),
    /// Add one line to an existing invoice
    AddLine(AddLineArgs),
    /// Assign a reference code to a line by hand
    SetReference(SetReferenceArgs),
    /// Create an invoice from a document file
    Process(ProcessArgs),
    /// Re-extract a document for an existing invoice, replacing its lines
    Reprocess(ReprocessArgs),
    /// Change an invoice's workflow status
    Status(StatusArgs),
    /// List invoices, newest first
    List(ListArgs),
    /// Show an invoice with its lines
    Show(InvoiceArgs),
    /// Create or merge a product-master row from a JSON payload
    UpsertProduct(PayloadArgs),
    /// Show a product-master row and its recent prices
    Product(ProductArgs),
    /// Print product-master import rows for an invoice
    Export(InvoiceArgs),
}

#[derive(Args)]
struct PayloadArgs {
    #[arg(help = "Path to a JSON payload")]
    path: PathBuf,
}

#[derive(Args)]
struct InvoiceArgs {
    #[arg(help = "Invoice id")]
    invoice: i32,
}

#[derive(Args)]
struct AddLineArgs {
    #[arg(long, help = "Invoice id")]
    invoice: i32,
    #[arg(long, help = "Reference code as printed on the invoice")]
    code: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    quantity: Option<Decimal>,
    #[arg(long, help = "Unit price")]
    price: Option<Decimal>,
    #[arg(long, help = "Line total; defaults to price times quantity")]
    total: Option<Decimal>,
    #[arg(long, default_value = "manual", help = "Origin tag: ocr or manual")]
    origin: ReferenceOrigin,
}

#[derive(Args)]
struct SetReferenceArgs {
    #[arg(long, help = "Invoice id")]
    invoice: i32,
    #[arg(long, help = "Line id")]
    line: i32,
    #[arg(long, help = "Reference code to assign")]
    code: String,
}

#[derive(Args)]
struct ProcessArgs {
    #[arg(help = "Document to ingest")]
    file: PathBuf,
    #[arg(
        long,
        help = "JSON extraction result to use instead of the stub extractor"
    )]
    extracted: Option<PathBuf>,
}

#[derive(Args)]
struct ReprocessArgs {
    #[arg(long, help = "Invoice id")]
    invoice: i32,
    #[arg(help = "Document to extract")]
    file: PathBuf,
    #[arg(
        long,
        help = "JSON extraction result to use instead of the stub extractor"
    )]
    extracted: Option<PathBuf>,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(long, help = "Invoice id")]
    invoice: i32,
    #[arg(help = "draft, needs_review, reviewed or exported")]
    status: InvoiceStatus,
    #[arg(long, action = ArgAction::SetTrue, help = "Clear the stored error code and message")]
    clear_error: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    supplier: Option<String>,
    #[arg(long)]
    status: Option<InvoiceStatus>,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 50)]
    per_page: u64,
}

#[derive(Args)]
struct ProductArgs {
    #[arg(help = "Canonical reference code")]
    code: String,
}

/// Shape of the `ingest` payload.
#[derive(Deserialize)]
struct InvoicePayload {
    header: InvoiceHeader,
    #[serde(default)]
    lines: Vec<NewLine>,
}

struct CliContext {
    _config: AppConfig,
    db: Arc<DbPool>,
    service: IngestionService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool).await.map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })?;
        }
        let db = Arc::new(db_pool);
        let service = IngestionService::new(db.clone(), config.ingest.clone());

        Ok(Self {
            _config: config,
            db,
            service,
        })
    }
}

async fn handle_ingest(context: &CliContext, args: PayloadArgs, json: bool) -> Result<()> {
    let payload: InvoicePayload = read_json(&args.path)?;
    let outcome = context
        .service
        .ingest_invoice(payload.header, payload.lines)
        .await
        .context("failed to ingest invoice")?;
    render_outcome(&outcome, json)
}

async fn handle_add_line(context: &CliContext, args: AddLineArgs, json: bool) -> Result<()> {
    let line = NewLine {
        reference_code: args.code,
        description: args.description,
        quantity: args.quantity,
        unit_price: args.price,
        line_total: args.total,
    };
    let saved = context
        .service
        .add_line(args.invoice, line, args.origin)
        .await
        .context("failed to add line")?;

    if json {
        print_json(&saved)
    } else {
        render_line(&saved);
        Ok(())
    }
}

async fn handle_set_reference(
    context: &CliContext,
    args: SetReferenceArgs,
    json: bool,
) -> Result<()> {
    let saved = context
        .service
        .set_line_reference(args.invoice, args.line, &args.code)
        .await
        .context("failed to set reference code")?;

    if json {
        print_json(&saved)
    } else {
        render_line(&saved);
        Ok(())
    }
}

async fn handle_process(context: &CliContext, args: ProcessArgs, json: bool) -> Result<()> {
    let upload = DocumentUpload::from_path(&args.file).await?;
    let extractor = extractor_for(args.extracted.as_deref())?;
    let outcome = context
        .service
        .process_document(upload, extractor.as_ref())
        .await
        .context("failed to process document")?;
    render_outcome(&outcome, json)
}

async fn handle_reprocess(context: &CliContext, args: ReprocessArgs, json: bool) -> Result<()> {
    let upload = DocumentUpload::from_path(&args.file).await?;
    let extractor = extractor_for(args.extracted.as_deref())?;
    let outcome = context
        .service
        .reprocess_document(args.invoice, upload, extractor.as_ref())
        .await
        .context("failed to reprocess document")?;
    render_outcome(&outcome, json)
}

async fn handle_status(context: &CliContext, args: StatusArgs, json: bool) -> Result<()> {
    let invoice = context
        .service
        .update_invoice_status(args.invoice, args.status, args.clear_error)
        .await
        .context("failed to update invoice status")?;

    if json {
        print_json(&invoice)
    } else {
        render_invoice(&invoice);
        Ok(())
    }
}

async fn handle_list(context: &CliContext, args: ListArgs, json: bool) -> Result<()> {
    let filter = InvoiceFilter {
        supplier_id: args.supplier,
        status: args.status,
        page: args.page,
        per_page: args.per_page,
        ..Default::default()
    };
    let page = context
        .service
        .list_invoices(filter)
        .await
        .context("failed to list invoices")?;

    if json {
        return print_json(&page);
    }
    println!(
        "{} invoices (page {}, {} per page)",
        page.total, page.page, page.per_page
    );
    for invoice in &page.invoices {
        render_invoice(invoice);
    }
    Ok(())
}

async fn handle_show(context: &CliContext, args: InvoiceArgs, json: bool) -> Result<()> {
    let invoice = context
        .service
        .get_invoice(args.invoice)
        .await
        .context("failed to load invoice")?;
    let lines = context.service.list_lines(args.invoice).await?;

    if json {
        #[derive(Serialize)]
        struct InvoiceView<'a> {
            invoice: &'a invoice::Model,
            lines: &'a [invoice_line::Model],
        }
        return print_json(&InvoiceView {
            invoice: &invoice,
            lines: &lines,
        });
    }
    render_invoice(&invoice);
    for line in &lines {
        render_line(line);
    }
    Ok(())
}

async fn handle_upsert_product(context: &CliContext, args: PayloadArgs, json: bool) -> Result<()> {
    let upsert: ProductUpsert = read_json(&args.path)?;
    let product = context
        .service
        .upsert_product(upsert)
        .await
        .context("failed to upsert product")?;

    if json {
        print_json(&product)
    } else {
        println!(
            "Product {} • cost {} • {}",
            product.reference_code,
            display_opt(product.unit_cost),
            product.description.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

async fn handle_product(context: &CliContext, args: ProductArgs, json: bool) -> Result<()> {
    let product = context
        .service
        .get_product(&args.code)
        .await
        .context("failed to load product")?;
    let history = context.service.price_history(&args.code).await?;

    if json {
        #[derive(Serialize)]
        struct ProductView<'a, P, H> {
            product: &'a P,
            history: &'a [H],
        }
        return print_json(&ProductView {
            product: &product,
            history: &history,
        });
    }
    println!(
        "Product {} • cost {} • qty {} • {}",
        product.reference_code,
        display_opt(product.unit_cost),
        display_opt(product.quantity_on_hand),
        product.description.as_deref().unwrap_or("-")
    );
    for observation in &history {
        println!(
            "  • {} from {} (invoice {}, line {}) at {}",
            observation.observed_price,
            observation.supplier_id,
            observation.invoice_id,
            observation.line_id,
            observation.created_at
        );
    }
    Ok(())
}

async fn handle_export(context: &CliContext, args: InvoiceArgs, json: bool) -> Result<()> {
    let rows = context
        .service
        .export_master_rows(args.invoice)
        .await
        .context("failed to export master rows")?;

    if json {
        return print_json(&rows);
    }
    println!("reference_code\tdescription\tquantity\tunit_cost");
    for row in &rows {
        println!(
            "{}\t{}\t{}\t{}",
            row.reference_code,
            row.description.as_deref().unwrap_or(""),
            display_opt(row.quantity),
            display_opt(row.unit_cost)
        );
    }
    Ok(())
}

fn extractor_for(extracted: Option<&Path>) -> Result<Box<dyn DocumentExtractor>> {
    match extracted {
        Some(path) => {
            let document: ExtractedDocument = read_json(path)?;
            Ok(Box::new(PreparsedExtractor::new(document)))
        }
        None => Ok(Box::new(StubExtractor)),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn render_outcome(outcome: &IngestOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    render_invoice(&outcome.invoice);
    for line in &outcome.lines {
        render_line(line);
    }
    println!("{} product master rows created", outcome.masters_created);
    Ok(())
}

fn render_invoice(invoice: &invoice::Model) {
    println!(
        "- Invoice {} • supplier {} • number {} • status {}",
        invoice.id,
        invoice.supplier_id,
        invoice.invoice_number.as_deref().unwrap_or("-"),
        invoice.status
    );
    if let Some(code) = &invoice.error_code {
        println!(
            "  ! {}: {}",
            code,
            invoice.error_message.as_deref().unwrap_or("")
        );
    }
}

fn render_line(line: &invoice_line::Model) {
    let flag = line
        .price_flag
        .map(|flag| format!(" [{}]", flag))
        .unwrap_or_default();
    println!(
        "  • line {} • {} • {} x {} (total {}){}",
        line.id,
        line.reference_code.as_deref().unwrap_or("<unresolved>"),
        display_opt(line.quantity),
        display_opt(line.unit_price),
        display_opt(line.line_total),
        flag
    );
}
