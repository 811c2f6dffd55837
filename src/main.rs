use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use delivery_flow::api::ApiClient;
use delivery_flow::config::AppConfig;
use delivery_flow::logging::init_tracing;
use delivery_flow::orders::{HttpOrderService, OrderService};
use delivery_flow::payments::phone::{
    format_with_country_code, providers_with_country_code, validate_with_country_code,
};
use delivery_flow::payments::{HttpPaymentGateway, MobileMoneyProvider, PaymentGateway};
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "delivery-flow")]
#[command(about = "Order and mobile-money payment diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration from the environment
    ValidateConfig,
    /// Check a phone number against a mobile-money provider
    ValidatePhone {
        phone: String,
        #[arg(value_parser = parse_provider)]
        medium: MobileMoneyProvider,
    },
    /// Read the backend status of an order
    OrderStatus { order_id: String },
    /// Verify a payment transaction once
    VerifyPayment { trans_id: String },
    /// Read the payment status of an order
    PaymentStatus { order_id: String },
}

fn parse_provider(raw: &str) -> Result<MobileMoneyProvider, String> {
    raw.parse().map_err(|e: delivery_flow::api::ApiError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api.base_url,
        "Starting delivery-flow"
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration is invalid");
        return Err(e).context("Configuration validation failed");
    }

    match cli.command {
        Commands::ValidateConfig => validate_config(&config),
        Commands::ValidatePhone { phone, medium } => validate_phone(&config, &phone, medium),
        Commands::OrderStatus { order_id } => order_status(&config, &order_id).await,
        Commands::VerifyPayment { trans_id } => verify_payment(&config, &trans_id).await,
        Commands::PaymentStatus { order_id } => payment_status(&config, &order_id).await,
    }
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn validate_config(config: &AppConfig) -> Result<()> {
    info!("Configuration is valid");
    print_json(json!({
        "valid": true,
        "baseUrl": config.api.base_url,
        "payment": {
            "pollIntervalSecs": config.payment.poll_interval_secs,
            "pollTimeoutSecs": config.payment.poll_timeout_secs,
            "maxRetries": config.payment.max_retries,
            "retryDelaySecs": config.payment.retry_delay_secs,
            "countryCode": config.payment.country_code,
        },
        "flow": {
            "restaurantTimeoutSecs": config.flow.restaurant_timeout_secs,
            "paymentWindowSecs": config.flow.payment_window_secs,
            "statusPollIntervalSecs": config.flow.status_poll_interval_secs,
        },
        "checkedAt": Utc::now().to_rfc3339(),
    }))
}

fn validate_phone(config: &AppConfig, phone: &str, medium: MobileMoneyProvider) -> Result<()> {
    let country_code = &config.payment.country_code;
    let valid = validate_with_country_code(phone, medium, country_code);
    let candidates: Vec<&str> = providers_with_country_code(phone, country_code)
        .iter()
        .map(|p| p.as_str())
        .collect();
    print_json(json!({
        "phone": format_with_country_code(phone, country_code),
        "medium": medium,
        "valid": valid,
        "acceptedBy": candidates,
    }))
}

fn api_client(config: &AppConfig) -> Result<ApiClient> {
    ApiClient::new(&config.api).context("Failed to initialize API client")
}

async fn order_status(config: &AppConfig, order_id: &str) -> Result<()> {
    let orders = HttpOrderService::new(api_client(config)?);
    let record = orders
        .get_order_status(order_id)
        .await
        .with_context(|| format!("Failed to read status of order {}", order_id))?;
    print_json(json!({
        "orderId": order_id,
        "status": record.status,
        "cancellationReason": record.cancellation_reason,
        "checkedAt": Utc::now().to_rfc3339(),
    }))
}

async fn verify_payment(config: &AppConfig, trans_id: &str) -> Result<()> {
    let gateway = HttpPaymentGateway::with_country_code(
        api_client(config)?,
        config.payment.country_code.clone(),
    );
    let verification = gateway.verify_payment_status(trans_id).await;
    print_json(json!({
        "transId": trans_id,
        "verification": verification,
        "checkedAt": Utc::now().to_rfc3339(),
    }))
}

async fn payment_status(config: &AppConfig, order_id: &str) -> Result<()> {
    let gateway = HttpPaymentGateway::with_country_code(
        api_client(config)?,
        config.payment.country_code.clone(),
    );
    let status = gateway.check_order_payment_status(order_id).await;
    print_json(json!({
        "orderId": order_id,
        "paymentStatus": status,
        "checkedAt": Utc::now().to_rfc3339(),
    }))
}
