//! Command implementations.
//!
//! Every editing command loads the board into a session, applies one edit and saves
//! the board back.

use crate::cli::{BindArgs, Commands, Format, MoveArgs, NewArgs};
use anyhow::{Context, bail};
use boardkit_core::{
    AutoSaveManager, Board, BoardRecord, CatalogFilter, ComponentRegistry, DataOrigin,
    DataSourceConfig, EditorSession, EngineConfig, FetchCapability, FieldSource, FileStorage,
    GridPoint, GridRect, InstanceId, OwnerScope, RefreshPolicy, RequestDescriptor, Storage,
    SubscriptionDescriptor,
};
use boardkit_render::{Frame, GridRenderer, PlacementKind, Renderer};
use serde_json::{Map, Value, json};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long `show` waits for the next data update before printing what it has.
const DATA_WAIT: Duration = Duration::from_secs(2);

/// Executes commands against one board directory.
pub struct Shell {
    config: EngineConfig,
    registry: Arc<ComponentRegistry>,
    fetch: Arc<dyn FetchCapability>,
    autosave: AutoSaveManager<FileStorage>,
    format: Format,
}

impl Shell {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ComponentRegistry>,
        storage: FileStorage,
        fetch: Arc<dyn FetchCapability>,
        format: Format,
    ) -> Self {
        let autosave = AutoSaveManager::new(Arc::new(storage))
            .with_interval(Duration::from_secs(config.storage.autosave_interval_secs));
        Self {
            config,
            registry,
            fetch,
            autosave,
            format,
        }
    }

    pub async fn run<W: Write>(&mut self, command: Commands, out: &mut W) -> anyhow::Result<()> {
        match command {
            Commands::Catalog {
                category,
                tag,
                grant,
                search,
            } => self.catalog(out, category, tag, grant, search),
            Commands::New(args) => self.new_board(out, args).await,
            Commands::List => self.list(out).await,
            Commands::Show { board } => self.show(out, board.as_deref()).await,
            Commands::Validate { path } => self.validate(out, &path),
            Commands::Add {
                board,
                type_id,
                x,
                y,
            } => {
                let position = x.zip(y).map(|(x, y)| GridPoint::new(x, y));
                let mut session = self.open(Some(&board)).await?;
                let instance_id = session.add_item(&type_id, position)?;
                self.persist(&session).await?;
                self.emit(out, json!({ "instance_id": instance_id }), |out| {
                    writeln!(out, "Added {} as {}", type_id, instance_id)
                })
            }
            Commands::Move(args) => self.move_item(out, args).await,
            Commands::Remove { board, instance } => {
                let mut session = self.open(Some(&board)).await?;
                let instance_id = InstanceId::from(instance);
                if !session.remove_item(&instance_id) {
                    bail!("no widget {} on board {}", instance_id, board);
                }
                self.persist(&session).await?;
                self.emit(out, json!({ "removed": instance_id }), |out| {
                    writeln!(out, "Removed {}", instance_id)
                })
            }
            Commands::Configure {
                board,
                instance,
                config,
            } => self.configure(out, &board, instance, &config).await,
            Commands::Bind(args) => self.bind(out, args).await,
            Commands::Delete { board } => {
                self.autosave
                    .delete(&board)
                    .await
                    .with_context(|| format!("deleting board {board}"))?;
                self.emit(out, json!({ "deleted": board }), |out| {
                    writeln!(out, "Deleted {}", board)
                })
            }
        }
    }

    fn emit<W: Write>(
        &self,
        out: &mut W,
        value: Value,
        table: impl FnOnce(&mut W) -> std::io::Result<()>,
    ) -> anyhow::Result<()> {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *out, &value)?;
                writeln!(out)?;
            }
            Format::Table => table(out)?,
        }
        Ok(())
    }

    fn catalog<W: Write>(
        &self,
        out: &mut W,
        category: Option<String>,
        tag: Option<String>,
        grant: Option<Vec<String>>,
        search: Option<String>,
    ) -> anyhow::Result<()> {
        let definitions = match search {
            Some(fragment) => self.registry.search(&fragment),
            None => {
                let filter = CatalogFilter {
                    category,
                    tag,
                    permissions: grant,
                };
                self.registry.list(Some(&filter))
            }
        };
        self.emit(out, json!(definitions), |out| {
            for d in &definitions {
                writeln!(
                    out,
                    "{:<12} {:<14} {:<10} default {}x{}  min {}x{}",
                    d.type_id,
                    d.name,
                    d.category.as_deref().unwrap_or("-"),
                    d.default_size.w,
                    d.default_size.h,
                    d.min_size.w,
                    d.min_size.h,
                )?;
            }
            Ok(())
        })
    }

    async fn new_board<W: Write>(&mut self, out: &mut W, args: NewArgs) -> anyhow::Result<()> {
        let mut owner = OwnerScope::tenant(args.tenant);
        if let Some(user) = args.user {
            owner = owner.with_user(user);
        }
        let mut board = Board::new(args.name, owner);
        board.description = args.description;
        board.home = args.home;

        self.autosave.set_board_id(None);
        self.autosave
            .save(&board)
            .await
            .context("saving new board")?;
        self.emit(out, json!({ "id": board.id, "name": board.name }), |out| {
            writeln!(out, "Created board {} ({})", board.name, board.id)
        })
    }

    async fn list<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        let storage = self.autosave.storage();
        let mut records = Vec::new();
        for id in self.autosave.list_boards().await? {
            match storage.load(&id).await {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable board {}: {}", id, e),
            }
        }
        let summary: Vec<Value> = records
            .iter()
            .map(|r| json!({ "id": r.id, "name": r.name, "tenant_id": r.tenant_id }))
            .collect();
        self.emit(out, json!(summary), |out| {
            for record in &records {
                writeln!(out, "{}  {}  ({})", record.id, record.name, record.tenant_id)?;
            }
            Ok(())
        })
    }

    async fn open(&mut self, board: Option<&str>) -> anyhow::Result<EditorSession> {
        let record = match board {
            Some(id) => self
                .autosave
                .load(id)
                .await
                .with_context(|| format!("loading board {id}"))?,
            None => self
                .autosave
                .load_last()
                .await
                .context("no board has been saved yet")?,
        };
        self.start(record)
    }

    fn start(&self, record: BoardRecord) -> anyhow::Result<EditorSession> {
        let session = EditorSession::load(
            self.registry.clone(),
            record,
            self.fetch.clone(),
            &self.config,
        )?;
        for diagnostic in session.diagnostics().iter() {
            diagnostic.log();
        }
        Ok(session)
    }

    async fn persist(&mut self, session: &EditorSession) -> anyhow::Result<()> {
        self.autosave
            .save(session.board())
            .await
            .with_context(|| format!("saving board {}", session.board().id))
    }

    async fn show<W: Write>(&mut self, out: &mut W, board: Option<&str>) -> anyhow::Result<()> {
        let mut session = self.open(board).await?;
        let mut renderer = GridRenderer::new(self.config.surface.clone());
        {
            let (board, mut ctx) = session.surface();
            renderer.init(board, &mut ctx)?;
        }

        while has_in_flight(&session) {
            if tokio::time::timeout(DATA_WAIT, session.next_data()).await.is_err() {
                log::warn!("Gave up waiting for data after {:?}", DATA_WAIT);
                break;
            }
        }

        let (board, mut ctx) = session.surface();
        let frame = renderer.render(board, &mut ctx)?.clone();
        renderer.destroy(&mut ctx)?;
        let diagnostics: Vec<String> = session
            .diagnostics()
            .iter()
            .chain(renderer.diagnostics().iter())
            .map(|d| d.to_string())
            .collect();
        let board = session.board();

        self.emit(out, frame_json(board, &frame, &diagnostics), |out| {
            writeln!(
                out,
                "{} ({})  {} columns, {} rows",
                board.name, board.id, self.config.surface.columns, frame.rows
            )?;
            for p in &frame.placements {
                let grid = format!("{},{} {}x{}", p.grid.x, p.grid.y, p.grid.w, p.grid.h);
                let data = match p.kind {
                    PlacementKind::Placeholder => "[unknown type]".to_string(),
                    PlacementKind::Widget => describe_data(&p.data),
                };
                writeln!(out, "  {:<38} {:<14} {:<10} {}", p.instance_id, p.type_id, grid, data)?;
            }
            for diagnostic in &diagnostics {
                writeln!(out, "warning: {}", diagnostic)?;
            }
            Ok(())
        })
    }

    fn validate<W: Write>(&self, out: &mut W, path: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let record: BoardRecord = serde_json::from_str(&content)
            .with_context(|| format!("parsing board record {}", path.display()))?;
        let loaded = Board::from_record(record, &self.registry)
            .with_context(|| format!("decoding items of {}", path.display()))?;
        let diagnostics: Vec<String> = loaded.diagnostics.iter().map(|d| d.to_string()).collect();
        let board = &loaded.board;
        self.emit(
            out,
            json!({ "id": board.id, "items": board.len(), "diagnostics": diagnostics }),
            |out| {
                writeln!(out, "{}: {} items", board.id, board.len())?;
                for diagnostic in &diagnostics {
                    writeln!(out, "warning: {}", diagnostic)?;
                }
                Ok(())
            },
        )
    }

    async fn move_item<W: Write>(&mut self, out: &mut W, args: MoveArgs) -> anyhow::Result<()> {
        let mut session = self.open(Some(&args.board)).await?;
        let instance_id = InstanceId::from(args.instance);
        let geometry = GridRect::new(args.x, args.y, args.w, args.h);
        session.move_resize(&instance_id, geometry)?;
        self.persist(&session).await?;
        self.emit(out, json!({ "instance_id": instance_id, "geometry": geometry }), |out| {
            writeln!(
                out,
                "Moved {} to {},{} {}x{}",
                instance_id, geometry.x, geometry.y, geometry.w, geometry.h
            )
        })
    }

    async fn configure<W: Write>(
        &mut self,
        out: &mut W,
        board: &str,
        instance: String,
        config: &str,
    ) -> anyhow::Result<()> {
        let config: Map<String, Value> =
            serde_json::from_str(config).context("configuration must be a JSON object")?;
        let mut session = self.open(Some(board)).await?;
        let instance_id = InstanceId::from(instance);
        let issues = session.configure(&instance_id, config)?;
        self.persist(&session).await?;
        let issues: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        self.emit(out, json!({ "instance_id": instance_id, "issues": issues }), |out| {
            writeln!(out, "Configured {}", instance_id)?;
            for issue in &issues {
                writeln!(out, "warning: {}", issue)?;
            }
            Ok(())
        })
    }

    async fn bind<W: Write>(&mut self, out: &mut W, args: BindArgs) -> anyhow::Result<()> {
        let source = field_source(&args)?;
        let mut session = self.open(Some(&args.board)).await?;
        let instance_id = InstanceId::from(args.instance);
        let item = session
            .board()
            .item(&instance_id)
            .with_context(|| format!("no widget {} on board {}", instance_id, args.board))?;

        let mut config: DataSourceConfig = item.data_source_config().clone();
        if let Some(device_id) = args.device {
            config.origin = DataOrigin::Device { device_id };
        }
        if let Some(ms) = args.refresh_ms {
            config.refresh = Some(RefreshPolicy::every(Duration::from_millis(ms)));
        }
        config.field_mapping.insert(args.field.clone(), source);

        session.bind_data(&instance_id, config)?;
        self.persist(&session).await?;
        self.emit(
            out,
            json!({ "instance_id": instance_id, "field": args.field }),
            |out| writeln!(out, "Bound {} of {}", args.field, instance_id),
        )
    }
}

fn field_source(args: &BindArgs) -> anyhow::Result<FieldSource> {
    if let Some(literal) = &args.literal {
        // Bare words are taken as strings.
        let value = serde_json::from_str(literal).unwrap_or_else(|_| json!(literal));
        return Ok(FieldSource::literal(value));
    }
    if let Some(endpoint) = &args.request {
        let mut descriptor = RequestDescriptor::get(endpoint);
        descriptor.select = args.select.clone();
        return Ok(FieldSource::Request(descriptor));
    }
    if let Some(channel) = &args.channel {
        let mut descriptor = SubscriptionDescriptor::channel(channel);
        descriptor.select = args.select.clone();
        return Ok(FieldSource::Subscription(descriptor));
    }
    bail!("one of --static, --request or --channel is required")
}

fn has_in_flight(session: &EditorSession) -> bool {
    let binder = session.binder();
    binder
        .active_instances()
        .iter()
        .any(|id| binder.in_flight(id) > 0)
}

fn describe_data(data: &boardkit_core::BindingSnapshot) -> String {
    let fields: Vec<String> = data
        .iter()
        .map(|(name, status)| match (&status.error, &status.current_value) {
            (Some(error), _) => format!("{name}: {error}"),
            (None, Some(value)) => format!("{name}={value}"),
            (None, None) => format!("{name}=-"),
        })
        .collect();
    fields.join("  ")
}

fn frame_json(board: &Board, frame: &Frame, diagnostics: &[String]) -> Value {
    let placements: Vec<Value> = frame
        .placements
        .iter()
        .map(|p| {
            let data: Map<String, Value> = p
                .data
                .iter()
                .map(|(name, status)| {
                    let entry = json!({
                        "bound": status.is_bound,
                        "valid": status.is_valid,
                        "value": status.current_value,
                        "error": status.error.as_ref().map(|e| e.to_string()),
                    });
                    (name.clone(), entry)
                })
                .collect();
            json!({
                "instance_id": p.instance_id,
                "type_id": p.type_id,
                "grid": p.grid,
                "bounds": [p.bounds.x0, p.bounds.y0, p.bounds.x1, p.bounds.y1],
                "placeholder": p.kind == PlacementKind::Placeholder,
                "config": p.config,
                "data": data,
            })
        })
        .collect();
    json!({
        "id": board.id,
        "name": board.name,
        "rows": frame.rows,
        "placements": placements,
        "diagnostics": diagnostics,
    })
}
