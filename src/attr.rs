use serde_json::{Map, Value};

const SUB_ATTR_PREFIX: &str = "sub_attr_";

fn sub_attr_key(index: usize) -> String {
    format!("{SUB_ATTR_PREFIX}{}", index + 1)
}

/// Splits a kernel attribute object into the keys every sub-kernel shares and the
/// `sub_attr_<n>` overrides of each of the `split_num` sub-kernels.
pub fn split_stitch_attr(attr: Option<&Value>, split_num: usize) -> (Map<String, Value>, Vec<Map<String, Value>>) {
    let mut sub_attr = vec![Map::new(); split_num];

    let Some(Value::Object(attr)) = attr else {
        return (Map::new(), sub_attr);
    };

    let common = attr
        .iter()
        .filter(|(key, _)| !key.starts_with(SUB_ATTR_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (i, sub) in sub_attr.iter_mut().enumerate() {
        if let Some(Value::Object(own)) = attr.get(&sub_attr_key(i)) {
            sub.extend(own.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
    }

    (common, sub_attr)
}

pub fn combine_stitch_attr(common: &Map<String, Value>, sub_attr: &[Map<String, Value>]) -> Map<String, Value> {
    let mut attr = common.clone();

    for (i, sub) in sub_attr.iter().enumerate().filter(|(_, sub)| !sub.is_empty()) {
        attr.insert(sub_attr_key(i), Value::Object(sub.clone()));
    }

    attr
}
