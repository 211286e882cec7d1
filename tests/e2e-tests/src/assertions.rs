//! Custom assertions for E2E tests

use sable_dev_registry::DevRegistry;

/// Assert that the registry holds `id`
pub fn assert_registered(registry: &DevRegistry, id: &str) -> Result<(), String> {
    if registry.service(id).is_some() {
        Ok(())
    } else {
        Err(format!(
            "Service instance '{}' is not registered. Registered: {:?}",
            id,
            registry.services().keys().collect::<Vec<_>>()
        ))
    }
}

/// Assert that the registry does not hold `id`
pub fn assert_not_registered(registry: &DevRegistry, id: &str) -> Result<(), String> {
    match registry.service(id) {
        None => Ok(()),
        Some(found) => Err(format!("Service instance '{}' is still registered: {:?}", id, found)),
    }
}

/// Assert that `id` is registered with exactly these tags, in order
pub fn assert_tags(registry: &DevRegistry, id: &str, expected: &[&str]) -> Result<(), String> {
    let service = registry
        .service(id)
        .ok_or_else(|| format!("Service instance '{}' is not registered", id))?;
    if service.tags == expected {
        Ok(())
    } else {
        Err(format!("Service instance '{}' has tags {:?}, expected {:?}", id, service.tags, expected))
    }
}

/// Assert that exactly `count` instances are registered
pub fn assert_service_count(registry: &DevRegistry, count: usize) -> Result<(), String> {
    let actual = registry.service_count();
    if actual == count {
        Ok(())
    } else {
        Err(format!(
            "Expected {} registered instances, found {}: {:?}",
            count,
            actual,
            registry.services().keys().collect::<Vec<_>>()
        ))
    }
}
