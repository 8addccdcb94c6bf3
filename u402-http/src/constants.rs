//! HTTP-specific constants of the UltraMarket payment gate.

/// JSON payment body (client → server).
pub const PAYMENT_HEADER: &str = "X-402-Payment";

/// Payer address of a traditional payment (client → server).
pub const PAYER_HEADER: &str = "X-402-Payer";

/// Explicit payment mode, `gasless` or `traditional` (client → server).
pub const MODE_HEADER: &str = "X-402-Mode";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// `error` field of a challenge.
pub const PAYMENT_REQUIRED_ERROR: &str = "Payment Required";

/// `error` field of a rejection by a local check.
pub const PAYMENT_INVALID_ERROR: &str = "Payment Invalid";

/// `error` field of a rejection on the facilitator leg.
pub const PAYMENT_PROCESSING_ERROR: &str = "Payment Processing Error";

/// Method names advertised in challenges.
pub const GASLESS_METHOD: &str = "eip-3009-gasless";

/// See [`GASLESS_METHOD`].
pub const TRADITIONAL_METHOD: &str = "eip-712-signature";
