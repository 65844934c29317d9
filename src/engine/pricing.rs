use crate::config::Config;
use crate::error::AppError;
use crate::models::order::PriceBreakdown;

const CGST_PERCENT: f64 = 9.0;
const SGST_PERCENT: f64 = 9.0;

/// Pure; the caller freezes the result into the order.
pub fn quote(subtotal: f64, surge_fee: f64, config: &Config) -> Result<PriceBreakdown, AppError> {
    if !subtotal.is_finite() || subtotal < 0.0 {
        return Err(AppError::InvalidAmount(format!(
            "subtotal must be a non-negative amount, got {subtotal}"
        )));
    }
    if !surge_fee.is_finite() || surge_fee < 0.0 {
        return Err(AppError::InvalidAmount(format!(
            "surge fee must be a non-negative amount, got {surge_fee}"
        )));
    }

    let cgst = round2(subtotal * CGST_PERCENT / 100.0);
    let sgst = round2(subtotal * SGST_PERCENT / 100.0);

    let free_delivery_applied = subtotal >= config.free_delivery_min;
    let delivery_fee = if free_delivery_applied {
        0.0
    } else {
        config.delivery_fee
    };

    let total = round2(subtotal + cgst + sgst + config.handling_fee + delivery_fee + surge_fee);

    Ok(PriceBreakdown {
        subtotal,
        cgst,
        sgst,
        handling_fee: config.handling_fee,
        delivery_fee,
        free_delivery_applied,
        surge_fee,
        total,
    })
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
