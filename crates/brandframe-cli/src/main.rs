use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use brandframe_contracts::brand::{
    AudienceInsightsRequest, BrandResearchRequest, ImageGenerationRequest, ProductDetailsRequest,
    ProductsRequest,
};
use brandframe_contracts::credentials::{
    mask_secret, CredentialKind, CredentialStore, Credentials, FileCredentialStore,
    MemoryCredentialStore,
};
use brandframe_contracts::events::EventWriter;
use brandframe_contracts::prompts::{build_image_generation_prompt, ProductEmphasis, PromptContext};
use brandframe_contracts::url::BareNamePolicy;
use brandframe_contracts::workflow::WorkflowRun;
use brandframe_engine::providers::{
    BrandIntelligence, DryrunGenerativeAi, GeminiClient, GenerativeAi, UpriverClient,
};
use brandframe_engine::{
    EngineConfig, EventLogObserver, Observers, Orchestrator, ProviderError, TracingObserver,
    WorkflowOptions,
};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "brandframe",
    version,
    about = "Turn a brand URL and a creative brief into a lifestyle image"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full brand to image pipeline and print a JSON report.
    Run(RunArgs),
    /// Manage stored API keys.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Invoke a single provider operation with a JSON request.
    Call(CallArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Brand URL or bare name; may be empty.
    #[arg(long, default_value = "")]
    brand: String,
    /// Free-form creative brief.
    #[arg(long, default_value = "")]
    brief: String,
    /// Append run events as JSON lines to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Generate text and images offline instead of calling Gemini.
    #[arg(long)]
    dryrun: bool,
    /// Treat a dotless brand name as a `.com` domain.
    #[arg(long)]
    append_dot_com: bool,
    /// Make the featured product the focal point of the image.
    #[arg(long)]
    product_focus: bool,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    /// Leave the image data URL out of the report.
    #[arg(long)]
    omit_image: bool,
}

#[derive(Debug, Subcommand)]
enum KeysAction {
    /// Store a key. Reads the value from stdin when omitted.
    Set { provider: Provider, value: Option<String> },
    /// Show which keys are available, masked.
    Show,
    /// Remove every stored key.
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Upriver,
    Gemini,
}

impl From<Provider> for CredentialKind {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Upriver => CredentialKind::Upriver,
            Provider::Gemini => CredentialKind::Gemini,
        }
    }
}

#[derive(Debug, Parser)]
struct CallArgs {
    operation: Operation,
    /// JSON request body. Read from stdin when omitted.
    request: Option<String>,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Operation {
    BrandResearch,
    Products,
    ProductDetails,
    AudienceInsights,
    Citations,
    GeneratePrompt,
    GenerateImage,
}

#[derive(Debug, Deserialize)]
struct CitationsCall {
    #[serde(default, alias = "continuationToken")]
    continuation_token: String,
}

#[derive(Debug, Deserialize)]
struct GeneratePromptCall {
    #[serde(flatten)]
    context: PromptContext,
    #[serde(default)]
    emphasis: ProductEmphasis,
}

/// Why a pass-through call produced no response.
#[derive(Debug)]
enum CallFailure {
    /// Malformed or incomplete request.
    Invalid(String),
    Provider(ProviderError),
}

impl CallFailure {
    fn exit_code(&self) -> i32 {
        match self {
            CallFailure::Invalid(_) => 2,
            CallFailure::Provider(_) => 1,
        }
    }

    fn message(&self) -> String {
        match self {
            CallFailure::Invalid(message) => message.clone(),
            CallFailure::Provider(err) => err.to_string(),
        }
    }
}

impl From<ProviderError> for CallFailure {
    fn from(err: ProviderError) -> Self {
        CallFailure::Provider(err)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("brandframe error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => run_workflow(args).await,
        Command::Keys { action } => run_keys(action),
        Command::Call(args) => run_call(args).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn,brandframe=info",
        1 => "warn,brandframe=debug",
        _ => "info,brandframe=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .init();
}

fn credential_store() -> Result<FileCredentialStore> {
    let path = FileCredentialStore::default_path()
        .context("no config directory; set BRANDFRAME_CREDENTIALS to a credentials file path")?;
    Ok(FileCredentialStore::new(path))
}

/// The run reads keys from `resolved`, or from the environment alone when no file store exists.
fn store_or_environment(resolved: Result<FileCredentialStore>) -> Arc<dyn CredentialStore> {
    match resolved {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "no credential file; using environment keys only");
            Arc::new(MemoryCredentialStore::default())
        }
    }
}

fn engine_config(dryrun: bool, text_model: Option<&str>, image_model: Option<&str>) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    config.set_text_model(text_model);
    config.set_image_model(image_model);
    debug!(
        dryrun,
        text_model = %config.text_model,
        image_model = %config.image_model,
        "engine config resolved"
    );
    config
}

fn generative_ai(config: &EngineConfig, dryrun: bool) -> Result<Arc<dyn GenerativeAi>> {
    if dryrun {
        return Ok(Arc::new(DryrunGenerativeAi));
    }
    let client = GeminiClient::new(config).context("failed to build the Gemini client")?;
    Ok(Arc::new(client))
}

async fn run_workflow(args: RunArgs) -> Result<i32> {
    let mut config = engine_config(args.dryrun, args.text_model.as_deref(), args.image_model.as_deref());
    if args.append_dot_com {
        config.bare_name_policy = BareNamePolicy::AppendDotCom;
    }
    if args.product_focus {
        config.emphasis = ProductEmphasis::FocalPoint;
    }

    let brand: Arc<dyn BrandIntelligence> =
        Arc::new(UpriverClient::new(&config).context("failed to build the Upriver client")?);
    let ai = generative_ai(&config, args.dryrun)?;
    let store = store_or_environment(credential_store());

    let session_id = Uuid::new_v4().to_string();
    let mut observers = Observers::new().with(Arc::new(TracingObserver));
    if let Some(path) = args.events.as_ref() {
        observers.push(Arc::new(EventLogObserver::new(EventWriter::new(
            path,
            session_id.clone(),
        ))));
    }

    let orchestrator = Orchestrator::new(brand, ai, store)
        .with_observers(observers)
        .with_options(WorkflowOptions::from(&config));
    let run = orchestrator.execute(&args.brand, &args.brief).await;

    let report = run_report(&session_id, &run, args.omit_image);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if run.terminal_error.is_some() { 1 } else { 0 })
}

fn run_report(session_id: &str, run: &WorkflowRun, omit_image: bool) -> Value {
    let image = run.results.image.as_ref().map(|image| {
        if omit_image {
            json!({ "mimeType": image.mime_type })
        } else {
            json!(image)
        }
    });
    json!({
        "session_id": session_id,
        "run_id": run.run_id,
        "brand_url_input": run.brand_url_input,
        "normalized_brand_url": run.normalized_brand_url,
        "brief": run.brief,
        "statuses": run.statuses,
        "flags": run.flags,
        "selection": run.selection,
        "failures": run.failures,
        "prompt": run.results.prompt,
        "image": image,
        "error": run.terminal_error.as_ref().map(ToString::to_string),
    })
}

fn run_keys(action: KeysAction) -> Result<i32> {
    let store = credential_store()?;
    match action {
        KeysAction::Set { provider, value } => {
            let value = match value {
                Some(value) => value,
                None => read_stdin().context("failed to read the key from stdin")?,
            };
            let value = value.trim();
            if value.is_empty() {
                bail!("refusing to store an empty key");
            }
            let kind = CredentialKind::from(provider);
            store.set(kind, value)?;
            println!("Stored {} ({}) in {}", kind.storage_key(), mask_secret(value), store.path().display());
        }
        KeysAction::Show => {
            for kind in CredentialKind::ALL {
                let stored = store.get(kind)?.filter(|value| !value.trim().is_empty());
                let line = match stored {
                    Some(value) => format!("{}: {} (stored)", kind.storage_key(), mask_secret(value.trim())),
                    None => match Credentials::from_env().get(kind) {
                        Some(value) => format!("{}: {} (environment)", kind.storage_key(), mask_secret(value)),
                        None => format!("{}: not set", kind.storage_key()),
                    },
                };
                println!("{line}");
            }
        }
        KeysAction::Clear => {
            store.clear()?;
            println!("Cleared stored keys in {}", store.path().display());
        }
    }
    Ok(0)
}

async fn run_call(args: CallArgs) -> Result<i32> {
    let raw = match args.request {
        Some(raw) => raw,
        None if io::stdin().is_terminal() => "{}".to_string(),
        None => read_stdin().context("failed to read the request from stdin")?,
    };
    let request: Value = if raw.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => return Ok(print_failure(&CallFailure::Invalid(format!("invalid JSON request: {err}")))),
        }
    };

    let config = engine_config(args.dryrun, args.text_model.as_deref(), args.image_model.as_deref());
    let brand = UpriverClient::new(&config).context("failed to build the Upriver client")?;
    let ai = generative_ai(&config, args.dryrun)?;
    let credentials = match credential_store().and_then(|store| Ok(Credentials::snapshot(&store)?)) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "credential store unreadable; using environment only");
            Credentials::from_env()
        }
    };

    match dispatch(args.operation, request, &brand, ai.as_ref(), &credentials).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Err(failure) => Ok(print_failure(&failure)),
    }
}

fn print_failure(failure: &CallFailure) -> i32 {
    println!("{}", json!({ "error": failure.message() }));
    failure.exit_code()
}

fn read_stdin() -> io::Result<String> {
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw)?;
    Ok(raw)
}

fn parse<T: for<'de> Deserialize<'de>>(request: Value) -> Result<T, CallFailure> {
    serde_json::from_value(request).map_err(|err| CallFailure::Invalid(format!("invalid request: {err}")))
}

/// Runs one provider operation; the JSON response is the provider's typed payload.
async fn dispatch(
    operation: Operation,
    request: Value,
    brand: &dyn BrandIntelligence,
    ai: &dyn GenerativeAi,
    credentials: &Credentials,
) -> Result<Value, CallFailure> {
    let response = match operation {
        Operation::BrandResearch => {
            let request: BrandResearchRequest = parse(request)?;
            if !request.has_subject() {
                return Err(CallFailure::Invalid(
                    "one of brand_url, brand_name or auto is required".to_string(),
                ));
            }
            json!(brand.brand_research(credentials, &request).await?)
        }
        Operation::Products => {
            let request: ProductsRequest = parse(request)?;
            if !request.has_subject() {
                return Err(CallFailure::Invalid(
                    "one of brand_url, brand_name or auto is required".to_string(),
                ));
            }
            json!(brand.products(credentials, &request).await?)
        }
        Operation::ProductDetails => {
            let request: ProductDetailsRequest = parse(request)?;
            if request.brand_name.trim().is_empty() || request.product_name.trim().is_empty() {
                return Err(CallFailure::Invalid(
                    "brand_name and product_name are required".to_string(),
                ));
            }
            json!(brand.product_details(credentials, &request).await?)
        }
        Operation::AudienceInsights => {
            let request: AudienceInsightsRequest = parse(request)?;
            json!(brand.audience_insights(credentials, &request).await?)
        }
        Operation::Citations => {
            let request: CitationsCall = parse(request)?;
            let token = request.continuation_token.trim();
            if token.is_empty() {
                return Err(CallFailure::Invalid("continuation_token is required".to_string()));
            }
            json!(brand.insight_citations(credentials, token).await?)
        }
        Operation::GeneratePrompt => {
            let request: GeneratePromptCall = parse(request)?;
            let prompt_request = build_image_generation_prompt(&request.context, request.emphasis);
            let prompt = ai.generate_text(credentials, &prompt_request).await?;
            json!({ "prompt": prompt, "provider": ai.name() })
        }
        Operation::GenerateImage => {
            let request: ImageGenerationRequest = parse(request)?;
            if request.prompt.trim().is_empty() {
                return Err(CallFailure::Invalid("prompt is required".to_string()));
            }
            json!(ai.generate_image(credentials, &request).await?)
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use brandframe_contracts::workflow::{StageName, WorkflowError};

    use super::*;

    fn offline_brand() -> anyhow::Result<UpriverClient> {
        let config = EngineConfig {
            upriver_api_base: "http://127.0.0.1:9".to_string(),
            ..EngineConfig::default()
        };
        Ok(UpriverClient::new(&config)?)
    }

    #[test]
    fn run_flags_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "brandframe",
            "-vv",
            "run",
            "--brand",
            "acme",
            "--brief",
            "summer launch",
            "--dryrun",
            "--append-dot-com",
            "--product-focus",
        ])?;
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            anyhow::bail!("expected the run command");
        };
        assert_eq!(args.brand, "acme");
        assert_eq!(args.brief, "summer launch");
        assert!(args.dryrun && args.append_dot_com && args.product_focus);
        assert!(args.events.is_none());
        Ok(())
    }

    #[test]
    fn call_operations_use_kebab_case() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["brandframe", "call", "audience-insights", "{}"])?;
        let Command::Call(args) = cli.command else {
            anyhow::bail!("expected the call command");
        };
        assert_eq!(args.operation, Operation::AudienceInsights);
        assert_eq!(args.request.as_deref(), Some("{}"));
        assert!(Cli::try_parse_from(["brandframe", "call", "unknown-op"]).is_err());
        Ok(())
    }

    #[test]
    fn keys_set_accepts_known_providers_only() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["brandframe", "keys", "set", "gemini", "secret"])?;
        let Command::Keys {
            action: KeysAction::Set { provider, value },
        } = cli.command
        else {
            anyhow::bail!("expected keys set");
        };
        assert_eq!(CredentialKind::from(provider), CredentialKind::Gemini);
        assert_eq!(value.as_deref(), Some("secret"));
        assert!(Cli::try_parse_from(["brandframe", "keys", "set", "openai", "x"]).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn requests_without_a_subject_are_rejected_before_any_call() -> anyhow::Result<()> {
        let brand = offline_brand()?;
        let credentials = Credentials::default();
        for (operation, request) in [
            (Operation::BrandResearch, json!({})),
            (Operation::Products, json!({ "brand_url": "  " })),
            (Operation::ProductDetails, json!({ "brand_name": "Acme", "product_name": "" })),
            (Operation::Citations, json!({})),
            (Operation::GenerateImage, json!({ "prompt": "" })),
        ] {
            let failure = dispatch(operation, request, &brand, &DryrunGenerativeAi, &credentials)
                .await
                .err()
                .ok_or_else(|| anyhow::anyhow!("{operation:?} should fail"))?;
            assert_eq!(failure.exit_code(), 2, "{operation:?}: {}", failure.message());
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_fails_as_provider_error() -> anyhow::Result<()> {
        let brand = offline_brand()?;
        let failure = dispatch(
            Operation::BrandResearch,
            json!({ "brand_url": "https://acme.com" }),
            &brand,
            &DryrunGenerativeAi,
            &Credentials::default(),
        )
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a missing credential"))?;
        assert_eq!(failure.exit_code(), 1);
        assert!(matches!(
            failure,
            CallFailure::Provider(ProviderError::MissingCredential { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn generate_operations_work_offline() -> anyhow::Result<()> {
        let brand = offline_brand()?;
        let credentials = Credentials::default();

        let prompt = dispatch(
            Operation::GeneratePrompt,
            json!({ "brandUrl": "https://acme.com", "emphasis": "focal_point" }),
            &brand,
            &DryrunGenerativeAi,
            &credentials,
        )
        .await
        .map_err(|failure| anyhow::anyhow!(failure.message()))?;
        assert_eq!(prompt["provider"], "dryrun");
        assert!(prompt["prompt"].as_str().is_some_and(|text| !text.is_empty()));

        let image = dispatch(
            Operation::GenerateImage,
            json!({ "prompt": "a picnic", "referenceImageUrls": [] }),
            &brand,
            &DryrunGenerativeAi,
            &credentials,
        )
        .await
        .map_err(|failure| anyhow::anyhow!(failure.message()))?;
        assert_eq!(image["mimeType"], "image/png");
        assert!(image["dataUrl"]
            .as_str()
            .is_some_and(|url| url.starts_with("data:image/png;base64,")));
        Ok(())
    }

    #[test]
    fn missing_credential_file_falls_back_to_an_empty_store() -> anyhow::Result<()> {
        let store = store_or_environment(Err(anyhow::anyhow!("no config directory")));
        for kind in CredentialKind::ALL {
            assert_eq!(store.get(kind)?, None);
        }
        let credentials = Credentials::snapshot_with(store.as_ref(), |name| {
            (name == "GEMINI_API_KEY").then(|| "from-env".to_string())
        })?;
        assert_eq!(credentials.get(CredentialKind::Gemini), Some("from-env"));
        Ok(())
    }

    #[test]
    fn report_carries_terminal_error_and_can_omit_image() {
        let mut run = WorkflowRun::new(3, "acme", "https://acme", "brief");
        run.fail(WorkflowError::Prompt("model unavailable".to_string()));
        let report = run_report("session", &run, true);
        assert_eq!(report["run_id"], 3);
        assert_eq!(report["normalized_brand_url"], "https://acme");
        assert!(report["image"].is_null());
        assert!(report["error"]
            .as_str()
            .is_some_and(|message| message.contains("model unavailable")));
        assert_eq!(report["statuses"][StageName::Prompt.as_str()], "not_started");
    }
}
