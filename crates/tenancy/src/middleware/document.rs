//! Document hooks.

use std::sync::Arc;

use crate::dimension::DimensionOptions;
use crate::model::DocumentInstance;
use crate::schema::DocumentHook;

/// Stamps the bound id into a document before it is validated.
///
/// Whatever the document says for the key is replaced, including a removed
/// or reassigned value.
pub fn add_dimension_id(options: Arc<DimensionOptions>) -> DocumentHook {
    Arc::new(move |doc: &mut DocumentInstance| {
        if let Some(id) = doc.dimension_id(&options.dimension) {
            doc.data_mut()
                .insert(options.dimension_id_key.clone(), id.into_value());
        }
        Ok(())
    })
}
