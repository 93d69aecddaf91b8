//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

const MAX_DESCRIPTION_CHARS: usize = 500;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal, what: &str) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(format!(
            "{what} must be positive, got {amount}"
        )))
    } else {
        Ok(())
    }
}

/// Validate that a description fits the store's memo column
pub fn validate_description(description: &str, what: &str) -> LedgerResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(LedgerError::Validation(format!(
            "{what} cannot exceed {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

/// Reject malformed requests before any store access
pub fn validate_request(request: &SyncRequest) -> LedgerResult<()> {
    if request.items.is_empty() {
        return Err(LedgerError::Validation(
            "Request must contain at least one item".to_string(),
        ));
    }

    validate_positive_amount(&request.total_amount, "Total amount")?;
    validate_description(&request.description, "Request description")?;

    for (index, item) in request.items.iter().enumerate() {
        let label = format!("Item {} amount", index + 1);
        validate_positive_amount(&item.amount, &label)?;
        if let Some(description) = &item.description {
            validate_description(description, &format!("Item {} description", index + 1))?;
        }
    }

    let items_total: BigDecimal = request.items.iter().map(|item| &item.amount).sum();
    if items_total != request.total_amount {
        return Err(LedgerError::Validation(format!(
            "Total amount {} does not match the sum of items {}",
            request.total_amount, items_total
        )));
    }

    Ok(())
}
