use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use crate::models::order::{Order, OrderItem, OrderStatus, PaymentMethod};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

const BRAND: &str = "Kailash.asia";
const BRAND_COLOR: &str = "#8A9C66";

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_otp(&self, to_email: &str, code: &str, expires_in_minutes: i64) -> Result<(), AppError>;
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError>;
    async fn send_cod_support_alert(&self, order: &Order) -> Result<(), AppError>;
}

/// Sends transactional mail over SMTP.
pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn mailbox(&self, display_name: &str) -> Result<Mailbox, AppError> {
        format!("{} <{}>", display_name, self.config.from_address)
            .parse()
            .map_err(|e| AppError::email(format!("Invalid from address: {}", e)))
    }

    async fn send_email(&self, from: Mailbox, to_email: &str, subject: &str, html_body: String, text_body: String) -> Result<(), AppError> {
        let email = Message::builder()
            .from(from)
            .to(to_email.parse().map_err(|e| AppError::email(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text_body))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html_body)),
            )
            .map_err(|e| AppError::email(format!("Failed to build email: {}", e)))?;

        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());

        let mailer = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| AppError::email(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        // lettre's SMTP transport is blocking
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::email(format!("Failed to spawn email sending task: {}", e)))?;

        let response = result.map_err(|e| AppError::email(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            smtp_code = %response.code(),
            "email sent"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_otp(&self, to_email: &str, code: &str, expires_in_minutes: i64) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(to = %to_email, "email delivery disabled, skipping OTP email");
            return Err(AppError::ChannelDisabled("email"));
        }

        let from = self.mailbox(&self.config.from_name)?;
        self.send_email(
            from,
            to_email,
            &format!("Your Verification Code - {BRAND}"),
            otp_email_html(code, expires_in_minutes),
            otp_email_text(code, expires_in_minutes),
        )
        .await
    }

    async fn send_order_confirmation(&self, order: &Order) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(order_id = %order.external_order_id, "email delivery disabled, skipping order confirmation");
            return Err(AppError::ChannelDisabled("email"));
        }

        let from = self.mailbox(&self.config.from_name)?;
        self.send_email(
            from,
            &order.customer_email,
            &format!("Order Confirmation - #{} | {BRAND}", order.external_order_id),
            order_confirmation_html(order, &self.config.support_address),
            order_confirmation_text(order, &self.config.support_address),
        )
        .await
    }

    async fn send_cod_support_alert(&self, order: &Order) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(order_id = %order.external_order_id, "email delivery disabled, skipping COD support alert");
            return Err(AppError::ChannelDisabled("email"));
        }

        let from = self.mailbox(&format!("{} Orders", self.config.from_name))?;
        self.send_email(
            from,
            &self.config.support_address,
            &format!(
                "[COD ORDER] New COD Order #{} - ₹{}",
                order.external_order_id,
                format_minor_units(order.amount)
            ),
            cod_alert_html(order),
            cod_alert_text(order),
        )
        .await
    }
}

/// Paise rendered as rupees with two decimals, e.g. `299900` → `2999.00`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Whole rupees with Indian digit grouping, e.g. `1234567` → `12,34,567`.
pub fn format_inr(rupees: i64) -> String {
    let digits = rupees.unsigned_abs().to_string();
    let sign = if rupees < 0 { "-" } else { "" };
    if digits.len() <= 3 {
        return format!("{sign}{digits}");
    }

    let (head, last_three) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();

    format!("{sign}{},{last_three}", groups.join(","))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn line_total(item: &OrderItem) -> String {
    format_inr(item.unit_price.saturating_mul(i64::from(item.quantity)))
}

fn is_cod(order: &Order) -> bool {
    order.payment_method == PaymentMethod::Cod || order.status == OrderStatus::CodPending
}

fn layout(title: &str, content: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
</head>
<body style="margin:0;padding:0;background-color:#FFFCF9;font-family:Arial,sans-serif;color:#373436;">
    <div style="max-width:600px;margin:0 auto;padding:20px;">
        <div style="text-align:center;margin-bottom:30px;">
            <h1 style="color:{BRAND_COLOR};margin:0;">{BRAND}</h1>
        </div>
        {content}
        <div style="border-top:1px solid #ddd;margin-top:30px;padding-top:20px;text-align:center;">
            <p style="color:#999;font-size:12px;margin:0;">&copy; {BRAND}. All rights reserved.</p>
        </div>
    </div>
</body>
</html>
"##
    )
}

fn otp_email_html(code: &str, expires_in_minutes: i64) -> String {
    let content = format!(
        r##"<h2 style="margin-bottom:20px;">Email Verification</h2>
        <p style="font-size:16px;line-height:1.5;">Your verification code is:</p>
        <div style="background-color:#FFFCF9;border:2px solid {BRAND_COLOR};border-radius:8px;padding:20px;text-align:center;margin:30px 0;">
            <div style="font-size:36px;font-weight:bold;color:{BRAND_COLOR};letter-spacing:8px;">{code}</div>
        </div>
        <p style="font-size:14px;line-height:1.5;">This code will expire in <strong>{expires_in_minutes} minutes</strong>.</p>
        <p style="color:#666;font-size:14px;line-height:1.5;margin-top:30px;">If you didn't request this code, please ignore this email.</p>"##
    );
    layout("Your verification code", &content)
}

fn otp_email_text(code: &str, expires_in_minutes: i64) -> String {
    format!(
        "Your OTP code is: {code}. This code will expire in {expires_in_minutes} minutes. If you didn't request this code, please ignore this email."
    )
}

fn order_confirmation_html(order: &Order, support_address: &str) -> String {
    let cod = is_cod(order);
    let amount = format_minor_units(order.amount);
    let order_date = order.created_at.format("%d %B %Y");

    let items: String = order
        .items
        .iter()
        .map(|item| {
            format!(
                r##"<tr>
                <td style="padding:10px;border-bottom:1px solid #eee;"><strong>{}</strong><br/><span style="color:#666;font-size:14px;">Size: {} | Qty: {}</span></td>
                <td style="padding:10px;border-bottom:1px solid #eee;text-align:right;">₹{}</td>
            </tr>"##,
                escape_html(&item.name),
                escape_html(&item.size),
                item.quantity,
                line_total(item)
            )
        })
        .collect();

    let status_message = if cod {
        "Your order has been placed successfully. Payment will be collected on delivery."
    } else {
        "We've received your payment and are preparing your items for shipment."
    };

    let cod_banner = if cod {
        format!(
            r##"<div style="background-color:#FFF3CD;border:1px solid #FFECB5;padding:15px;border-radius:8px;margin:20px 0;">
            <p style="color:#856404;margin:0;font-weight:bold;">Cash on Delivery Order</p>
            <p style="color:#856404;margin:5px 0 0 0;font-size:14px;">Please keep ₹{amount} ready at the time of delivery.</p>
        </div>"##
        )
    } else {
        String::new()
    };

    let payment_row = if cod {
        r##"<tr><td style="padding:5px 0;"><strong>Payment Method:</strong></td><td style="padding:5px 0;text-align:right;">Cash on Delivery</td></tr>"##.to_string()
    } else {
        format!(
            r##"<tr><td style="padding:5px 0;"><strong>Payment ID:</strong></td><td style="padding:5px 0;text-align:right;">{}</td></tr>"##,
            escape_html(order.payment_id.as_deref().unwrap_or("N/A"))
        )
    };

    let content = format!(
        r##"<div style="background-color:white;padding:30px;border-radius:8px;">
        <h2 style="margin-top:0;">Thank you for your order!</h2>
        <p style="font-size:16px;line-height:1.5;">Hi {name},</p>
        <p style="font-size:16px;line-height:1.5;">{status_message}</p>
        {cod_banner}
        <div style="background-color:#f5f5f5;padding:20px;border-radius:8px;margin:20px 0;">
            <h3 style="margin-top:0;">Order Summary</h3>
            <table style="width:100%;border-collapse:collapse;">
                <tr><td style="padding:5px 0;"><strong>Order ID:</strong></td><td style="padding:5px 0;text-align:right;">{order_id}</td></tr>
                {payment_row}
                <tr><td style="padding:5px 0;"><strong>Order Date:</strong></td><td style="padding:5px 0;text-align:right;">{order_date}</td></tr>
                <tr><td style="padding:5px 0;"><strong>Total Amount:</strong></td><td style="padding:5px 0;text-align:right;color:{BRAND_COLOR};font-size:18px;">₹{amount}</td></tr>
            </table>
        </div>
        <h3>Items Ordered</h3>
        <table style="width:100%;border-collapse:collapse;">{items}</table>
        <div style="background-color:#f5f5f5;padding:20px;border-radius:8px;margin:20px 0;">
            <h3 style="margin-top:0;">Shipping Details</h3>
            <p style="margin:5px 0;"><strong>{name}</strong></p>
            <p style="margin:5px 0;color:#666;">{address}</p>
            <p style="margin:5px 0;color:#666;">PIN: {pin}</p>
            <p style="margin:5px 0;color:#666;">Phone: {phone}</p>
        </div>
        <div style="text-align:center;margin:30px 0;">
            <p style="color:#666;font-size:14px;">Need help?</p>
            <p><strong>Email:</strong> {support}</p>
        </div>
    </div>"##,
        name = escape_html(&order.customer_name),
        order_id = escape_html(&order.external_order_id),
        address = escape_html(&order.shipping_address),
        pin = escape_html(&order.postal_code),
        phone = escape_html(&order.customer_phone),
        support = escape_html(support_address),
    );

    layout("Order confirmation", &content)
}

fn order_confirmation_text(order: &Order, support_address: &str) -> String {
    let cod = is_cod(order);
    let amount = format_minor_units(order.amount);
    let items: Vec<String> = order
        .items
        .iter()
        .map(|item| format!("- {} ({}) x {} - ₹{}", item.name, item.size, item.quantity, line_total(item)))
        .collect();

    let cod_line = if cod {
        format!("CASH ON DELIVERY ORDER - Please keep ₹{amount} ready at the time of delivery.\n")
    } else {
        String::new()
    };
    let payment_line = if cod {
        "Payment Method: Cash on Delivery".to_string()
    } else {
        format!("Payment ID: {}", order.payment_id.as_deref().unwrap_or("N/A"))
    };

    format!(
        r#"Thank you for your order, {name}!

{cod_line}
ORDER SUMMARY
Order ID: {order_id}
{payment_line}
Order Date: {date}
Total Amount: ₹{amount}

ITEMS ORDERED
{items}

SHIPPING DETAILS
{name}
{address}
PIN: {pin}
Phone: {phone}

NEED HELP?
Email: {support_address}

Thank you for shopping with {BRAND}!
"#,
        name = order.customer_name,
        order_id = order.external_order_id,
        date = order.created_at.format("%d %B %Y"),
        items = items.join("\n"),
        address = order.shipping_address,
        pin = order.postal_code,
        phone = order.customer_phone,
    )
}

fn cod_alert_html(order: &Order) -> String {
    let items: String = order
        .items
        .iter()
        .map(|item| {
            format!(
                r##"<tr><td style="padding:8px;border:1px solid #ddd;">{}</td><td style="padding:8px;border:1px solid #ddd;">{}</td><td style="padding:8px;border:1px solid #ddd;">{}</td><td style="padding:8px;border:1px solid #ddd;">₹{}</td></tr>"##,
                escape_html(&item.name),
                escape_html(&item.size),
                item.quantity,
                line_total(item)
            )
        })
        .collect();

    let content = format!(
        r##"<div style="background-color:#FFF3CD;border:1px solid #FFECB5;padding:15px;border-radius:8px;margin-bottom:20px;">
        <h2 style="color:#856404;margin:0;">New Cash on Delivery Order</h2>
    </div>
    <h3>Order Details</h3>
    <table style="width:100%;border-collapse:collapse;margin-bottom:20px;">
        <tr><td><strong>Order ID:</strong></td><td>{order_id}</td></tr>
        <tr><td><strong>Order Date:</strong></td><td>{date}</td></tr>
        <tr><td><strong>Total Amount:</strong></td><td>₹{amount}</td></tr>
        <tr><td><strong>Payment Method:</strong></td><td>Cash on Delivery</td></tr>
    </table>
    <h3>Customer Information</h3>
    <table style="width:100%;border-collapse:collapse;margin-bottom:20px;">
        <tr><td><strong>Name:</strong></td><td>{name}</td></tr>
        <tr><td><strong>Email:</strong></td><td>{email}</td></tr>
        <tr><td><strong>Phone:</strong></td><td>{phone}</td></tr>
        <tr><td><strong>Address:</strong></td><td>{address}</td></tr>
        <tr><td><strong>PIN Code:</strong></td><td>{pin}</td></tr>
    </table>
    <h3>Items Ordered</h3>
    <table style="width:100%;border-collapse:collapse;margin-bottom:20px;">
        <tr><th>Product</th><th>Size</th><th>Qty</th><th>Price</th></tr>
        {items}
    </table>
    <p style="color:#666;">This is an automated notification. Please process this COD order accordingly.</p>"##,
        order_id = escape_html(&order.external_order_id),
        date = order.created_at.format("%d %B %Y %H:%M"),
        amount = format_minor_units(order.amount),
        name = escape_html(&order.customer_name),
        email = escape_html(&order.customer_email),
        phone = escape_html(&order.customer_phone),
        address = escape_html(&order.shipping_address),
        pin = escape_html(&order.postal_code),
    );

    layout("New COD order", &content)
}

fn cod_alert_text(order: &Order) -> String {
    let items: Vec<String> = order
        .items
        .iter()
        .map(|item| format!("- {} ({}) x {} - ₹{}", item.name, item.size, item.quantity, line_total(item)))
        .collect();

    format!(
        r#"NEW CASH ON DELIVERY ORDER

ORDER DETAILS
Order ID: {}
Order Date: {}
Total Amount: ₹{}
Payment Method: Cash on Delivery

CUSTOMER INFORMATION
Name: {}
Email: {}
Phone: {}
Address: {}
PIN Code: {}

ITEMS ORDERED
{}

This is an automated notification. Please process this COD order accordingly.
"#,
        order.external_order_id,
        order.created_at.format("%d %B %Y %H:%M"),
        format_minor_units(order.amount),
        order.customer_name,
        order.customer_email,
        order.customer_phone,
        order.shipping_address,
        order.postal_code,
        items.join("\n")
    )
}
