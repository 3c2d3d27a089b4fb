use aws_sdk_dynamodb::types::AttributeValue;
use state::{Condition, Update};
use std::collections::HashMap;

/// Placeholders shared by the expressions of one request.
#[derive(Debug, Default)]
pub(crate) struct Expression {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Expression {
    pub(crate) fn name(&mut self, name: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, existing)| *existing == name) {
            return placeholder.clone();
        }

        let placeholder: String = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), name.to_string());
        placeholder
    }

    pub(crate) fn value(&mut self, value: impl Into<AttributeValue>) -> String {
        let placeholder: String = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.into());
        placeholder
    }

    /// `None` for an empty conjunction.
    pub(crate) fn condition(&mut self, condition: &Condition) -> Option<String> {
        match condition {
            Condition::AttributeExists(name) => {
                Some(format!("attribute_exists({})", self.name(name)))
            }
            Condition::AttributeNotExists(name) => {
                Some(format!("attribute_not_exists({})", self.name(name)))
            }
            Condition::All(conditions) => {
                let parts: Vec<String> = conditions
                    .iter()
                    .filter_map(|condition| self.condition(condition))
                    .collect();

                match parts.len() {
                    0 => None,
                    1 => parts.into_iter().next(),
                    _ => Some(
                        parts
                            .iter()
                            .map(|part| format!("({part})"))
                            .collect::<Vec<String>>()
                            .join(" AND "),
                    ),
                }
            }
        }
    }

    /// `SET a = :x ADD b :y REMOVE c`, clauses omitted when empty.
    pub(crate) fn update(&mut self, update: &Update) -> String {
        let mut clauses: Vec<String> = Vec::new();

        let set: Vec<String> = update
            .set
            .iter()
            .map(|(name, value)| {
                format!("{} = {}", self.name(name), self.value(value.clone()))
            })
            .collect();
        if !set.is_empty() {
            clauses.push(format!("SET {}", set.join(", ")));
        }

        let add: Vec<String> = update
            .increment
            .iter()
            .map(|(name, by)| {
                format!(
                    "{} {}",
                    self.name(name),
                    self.value(AttributeValue::N(by.to_string()))
                )
            })
            .collect();
        if !add.is_empty() {
            clauses.push(format!("ADD {}", add.join(", ")));
        }

        let remove: Vec<String> = update.remove.iter().map(|name| self.name(name)).collect();
        if !remove.is_empty() {
            clauses.push(format!("REMOVE {}", remove.join(", ")));
        }

        clauses.join(" ")
    }

    /// Attribute names, `None` when no placeholder was handed out.
    pub(crate) fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Attribute values, `None` when no placeholder was handed out.
    pub(crate) fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{KeyAttribute, PrimaryKey};

    fn key() -> PrimaryKey {
        PrimaryKey::new(
            KeyAttribute::string("event_id", "orders#1"),
            Some(KeyAttribute::string("target_queue_url", "https://queue/a.fifo")),
        )
    }

    #[test]
    fn absent_row_condition_names_every_key_attribute() {
        let mut expression: Expression = Expression::default();

        let condition: Option<String> = expression.condition(&Condition::row_absent(&key()));

        assert_eq!(
            Some("(attribute_not_exists(#n0)) AND (attribute_not_exists(#n1))".to_string()),
            condition
        );
        assert_eq!(
            Some(&"event_id".to_string()),
            expression.names().unwrap().get("#n0")
        );
        assert_eq!(None, expression.values());
    }

    #[test]
    fn update_shares_placeholders_with_condition() {
        let mut expression: Expression = Expression::default();
        let update: Update = Update::new("workflows", key())
            .set("finished_at", serde_dynamo::AttributeValue::S("2023-10-15T12:45:14Z".to_string()))
            .increment("amount_of_starts", 1)
            .remove("is_open")
            .condition(Condition::attribute_exists("is_open"));

        let update_expression: String = expression.update(&update);
        let condition: Option<String> = expression.condition(&Condition::attribute_exists("is_open"));

        assert_eq!("SET #n0 = :v0 ADD #n1 :v1 REMOVE #n2", update_expression);
        assert_eq!(Some("attribute_exists(#n2)".to_string()), condition);
        assert_eq!(
            Some(&AttributeValue::N("1".to_string())),
            expression.values().unwrap().get(":v1")
        );
    }

    #[test]
    fn empty_conjunction_has_no_expression() {
        assert_eq!(None, Expression::default().condition(&Condition::All(vec![])));
    }
}
