use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use pdf_annotator_core::{
    delete_document, sanitize, upload_document, DocPoint, DocumentRecord, DocumentScope,
    DocumentStore, LogNotifier, MemoryDocumentStore, Notification, NotificationLog, PageSize,
    ScreenPoint, Tool,
};
use pdf_annotator_render::{
    DrawCommand, HeadlessRasterizer, LopdfRasterizer, PageRasterizer, PageRenderController,
    RecordingSurface, RenderOutcome,
};
use pdf_annotator_storage::Storage;
use pdf_annotator_viewer::{Viewer, ViewerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

const APP_ID: &str = "pdf-annotator";

/// Page size assumed for pages of a document opened without its PDF
const LETTER: PageSize = PageSize { width: 612.0, height: 792.0 };

#[derive(Debug, Parser)]
#[command(name = "pdf-annotator")]
#[command(about = "PDF annotation toolkit")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the cleaned annotation payload of a document record.
    Sanitize {
        #[arg(value_name = "DOCUMENT")]
        document: PathBuf,
    },
    /// Drive the drawing engine with a scripted gesture sequence.
    Replay {
        #[arg(value_name = "DOCUMENT")]
        document: PathBuf,
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
        #[command(flatten)]
        open: OpenArgs,
        /// Write the saved document record here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the overlay draw commands of one page as JSON.
    Compose {
        #[arg(value_name = "DOCUMENT")]
        document: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        zoom: Option<f32>,
        #[command(flatten)]
        open: OpenArgs,
    },
    /// Render the base surface of a page to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Upload a PDF into local storage.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// List stored documents, newest first.
    List {
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Delete a stored document and its PDF bytes.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Print the effective viewer configuration.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct OpenArgs {
    /// PDF to take page geometry from.
    #[arg(long)]
    pdf: Option<PathBuf>,
    /// Viewer configuration file; defaults to the environment.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StorageArgs {
    /// Storage root; defaults to the platform data directory.
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long, default_value = "local")]
    user: String,
}

impl StorageArgs {
    fn storage(&self) -> Result<Storage> {
        let storage = match &self.root {
            Some(root) => Storage::with_root(root),
            None => Storage::from_default_project()?,
        };
        storage.ensure_root()?;
        Ok(storage)
    }

    fn scope(&self) -> DocumentScope {
        DocumentScope::new(APP_ID, &self.user)
    }
}

/// One scripted input. `down` takes a zero-based page index and screen coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Step {
    Tool(Tool),
    Zoom(f32),
    Color(String),
    /// Text for the next text placement
    Prompt(String),
    Down { page: u32, x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Undo,
    Redo,
    DeleteSelected,
    ClearSelection,
    Save,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayReport {
    annotations: Value,
    notifications: Vec<Notification>,
    zoom: f32,
    can_undo: bool,
    can_redo: bool,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Sanitize { document } => run_sanitize(&document),
        Commands::Replay { document, script, open, output } => {
            run_replay(&document, &script, &open, output.as_deref())
        }
        Commands::Compose { document, page, zoom, open } => run_compose(&document, page, zoom, &open),
        Commands::Render { file, page, zoom, output } => run_render(&file, page, zoom, output.as_deref()),
        Commands::Import { file, storage } => run_import(&file, &storage),
        Commands::List { storage } => run_list(&storage),
        Commands::Delete { id, storage } => run_delete(&id, &storage),
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print_json(&config)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_sanitize(document: &Path) -> Result<()> {
    let record = read_document(document)?;
    print_json(&sanitize(&record.load_annotations())?)
}

fn run_replay(document: &Path, script: &Path, open: &OpenArgs, output: Option<&Path>) -> Result<()> {
    let record = read_document(document)?;
    ensure_file_exists(script)?;
    let contents = fs::read_to_string(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&contents).context("invalid replay script")?;
    let config = load_config(open.config.as_deref())?;

    let (report, saved) = match &open.pdf {
        Some(pdf) => replay(config, record, open_pdf(pdf)?, &steps)?,
        None => {
            let script_pages = steps.iter().filter_map(|step| match step {
                Step::Down { page, .. } => Some(*page),
                _ => None,
            });
            let rasterizer = headless_for(&record, script_pages);
            replay(config, record, rasterizer, &steps)?
        }
    };

    if let Some(output) = output {
        let json = serde_json::to_vec_pretty(&saved)?;
        fs::write(output, json)
            .with_context(|| format!("failed to write document to {}", output.display()))?;
    }

    print_json(&report)
}

fn replay<R: PageRasterizer>(
    config: ViewerConfig,
    record: DocumentRecord,
    rasterizer: R,
    steps: &[Step],
) -> Result<(ReplayReport, DocumentRecord)> {
    let scope = DocumentScope::new(APP_ID, "replay");
    let store = MemoryDocumentStore::new();
    let record = store.create(&scope, record)?;
    let log = NotificationLog::new();

    let mut viewer =
        Viewer::open(config, scope.clone(), record.clone(), rasterizer, store.clone(), log.clone())?;

    let pending: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let prompt = Rc::clone(&pending);
    viewer.set_text_prompt(move |_page: u32, _at: DocPoint| prompt.borrow_mut().take());

    for (index, step) in steps.iter().enumerate() {
        debug!("step {index}: {step:?}");
        match step {
            Step::Tool(tool) => {
                viewer.set_tool(*tool);
            }
            Step::Zoom(zoom) => {
                viewer.set_zoom(*zoom);
            }
            Step::Color(color) => viewer.set_color(color.as_str()),
            Step::Prompt(text) => *pending.borrow_mut() = Some(text.clone()),
            Step::Down { page, x, y } => {
                viewer.pointer_down(*page, ScreenPoint::new(*x, *y));
            }
            Step::Move { x, y } => {
                viewer.pointer_move(ScreenPoint::new(*x, *y));
            }
            Step::Up => {
                viewer.pointer_up();
            }
            Step::Undo => {
                viewer.undo();
            }
            Step::Redo => {
                viewer.redo();
            }
            Step::DeleteSelected => {
                viewer.delete_selected();
            }
            Step::ClearSelection => {
                viewer.clear_selection();
            }
            Step::Save => {
                viewer.save();
            }
        }
    }

    // A script may end mid-gesture
    viewer.pointer_up();

    for page_index in viewer.dirty_pages() {
        if page_index < viewer.page_count() {
            viewer.render_page(page_index);
        }
    }
    viewer.close();

    let report = ReplayReport {
        annotations: sanitize(viewer.annotations())?,
        notifications: log.entries(),
        zoom: viewer.zoom(),
        can_undo: viewer.engine().history().can_undo(),
        can_redo: viewer.engine().history().can_redo(),
    };
    let saved = store.get(&scope, &record.id)?;
    Ok((report, saved))
}

fn run_compose(document: &Path, page: u32, zoom: Option<f32>, open: &OpenArgs) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let page_index = page - 1;
    let record = read_document(document)?;
    let config = load_config(open.config.as_deref())?.with_autosave(false);

    let commands = match &open.pdf {
        Some(pdf) => compose(config, record, open_pdf(pdf)?, page_index, zoom)?,
        None => {
            let rasterizer = headless_for(&record, std::iter::once(page_index));
            compose(config, record, rasterizer, page_index, zoom)?
        }
    };

    print_json(&commands)
}

fn compose<R: PageRasterizer>(
    config: ViewerConfig,
    record: DocumentRecord,
    rasterizer: R,
    page_index: u32,
    zoom: Option<f32>,
) -> Result<Vec<DrawCommand>> {
    if page_index >= rasterizer.page_count() {
        anyhow::bail!(
            "page {} is out of range (document has {} pages)",
            page_index + 1,
            rasterizer.page_count()
        );
    }

    let scope = DocumentScope::new(APP_ID, "compose");
    let mut viewer =
        Viewer::open(config, scope, record, rasterizer, MemoryDocumentStore::new(), LogNotifier)?;
    if let Some(zoom) = zoom {
        viewer.set_zoom(zoom);
    }

    let mut surface = RecordingSurface::new();
    viewer.paint(page_index, &mut surface);
    Ok(surface.into_commands())
}

fn run_render(file: &Path, page: u32, zoom: f32, output: Option<&Path>) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if !(zoom.is_finite() && zoom > 0.0) {
        anyhow::bail!("--zoom must be a positive number");
    }

    let rasterizer = open_pdf(file)?;
    let page_index = page - 1;
    let mut renders = PageRenderController::new();

    match renders.render(&rasterizer, page_index, zoom, &LogNotifier) {
        RenderOutcome::Committed => {}
        outcome => anyhow::bail!("page {page} could not be rendered ({outcome:?})"),
    }
    let image = renders.surface(page_index).context("rendered page is missing")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_import(file: &Path, args: &StorageArgs) -> Result<()> {
    let rasterizer = open_pdf(file)?;
    let bytes = fs::read(file)?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .context("file name is not valid UTF-8")?;

    let storage = args.storage()?;
    let record = upload_document(
        &storage.documents(),
        &storage.blobs(),
        &args.scope(),
        file_name,
        &bytes,
        now_millis(),
    )
    .context("failed to import document")?;
    debug!("imported {} ({} pages)", record.id, rasterizer.page_count());

    print_json(&record)
}

fn run_list(args: &StorageArgs) -> Result<()> {
    let storage = args.storage()?;
    let records = storage.documents().list(&args.scope()).context("failed to list documents")?;
    print_json(&records)
}

fn run_delete(id: &str, args: &StorageArgs) -> Result<()> {
    let storage = args.storage()?;
    let scope = args.scope();
    let docs = storage.documents();
    let record = docs.get(&scope, id).with_context(|| format!("no document with id {id}"))?;
    delete_document(&docs, &storage.blobs(), &scope, &record)
        .with_context(|| format!("failed to delete document {id}"))?;

    println!("deleted:{id}");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => ViewerConfig::from_env().context("invalid environment configuration"),
    }
}

/// Read a document record, or a bare annotation array as an unnamed document
fn read_document(path: &Path) -> Result<DocumentRecord> {
    ensure_file_exists(path)?;
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    if value.is_array() {
        let name = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("document");
        let mut record = DocumentRecord::new("", name, "", "", 0);
        record.annotations = value;
        return Ok(record);
    }

    serde_json::from_value(value).with_context(|| format!("{} is not a document record", path.display()))
}

fn open_pdf(path: &Path) -> Result<LopdfRasterizer> {
    ensure_file_exists(path)?;
    LopdfRasterizer::open(path).context("failed to open PDF")
}

/// Headless pages covering every page the document and `extra` refer to
fn headless_for(record: &DocumentRecord, extra: impl IntoIterator<Item = u32>) -> HeadlessRasterizer {
    let last = record
        .load_annotations()
        .iter()
        .flat_map(|annotation| annotation.pages())
        .chain(extra)
        .max()
        .unwrap_or(0);
    HeadlessRasterizer::uniform(last.saturating_add(1), LETTER)
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
