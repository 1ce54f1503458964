//
// features/lifecycle.rs
//
// Cache upkeep on document synchronization events
//

use std::sync::Arc;

use super::{DocumentEvent, FeatureBus, Services};
use crate::bus::HandlerDescriptor;

fn invalidate(services: &Services, event: &DocumentEvent) {
    services.semantic_tokens.remove(&event.uri);
    let importers = services.resolver.invalidate(&event.uri);
    if !importers.is_empty() {
        log::debug!("{} invalidates {} importer(s)", event.uri, importers.len());
    }
}

pub fn register(bus: &mut FeatureBus, services: &Arc<Services>) {
    let s = Arc::clone(services);
    bus.did_open.register(HandlerDescriptor::new("namespace_open"), move |event: DocumentEvent| {
        let services = Arc::clone(&s);
        async move {
            if event.changed {
                invalidate(&services, &event);
            }
            anyhow::Ok(())
        }
    });

    let s = Arc::clone(services);
    bus.did_change.register(HandlerDescriptor::new("namespace_change"), move |event: DocumentEvent| {
        let services = Arc::clone(&s);
        async move {
            invalidate(&services, &event);
            anyhow::Ok(())
        }
    });

    let s = Arc::clone(services);
    bus.did_save.register(HandlerDescriptor::new("namespace_save"), move |event: DocumentEvent| {
        let services = Arc::clone(&s);
        async move {
            if event.changed {
                invalidate(&services, &event);
            }
            anyhow::Ok(())
        }
    });

    let s = Arc::clone(services);
    bus.did_close.register(HandlerDescriptor::new("namespace_close"), move |event: DocumentEvent| {
        let services = Arc::clone(&s);
        async move {
            for resource in services.resolver.release(&event.uri) {
                log::trace!("Released {} with {}", resource, event.uri);
                services.semantic_tokens.remove(&resource);
            }
            invalidate(&services, &event);
            anyhow::Ok(())
        }
    });
}
