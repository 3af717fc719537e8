use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Upper bound for a person's name in bytes. Names travel inside
/// `filter:<name>` button payloads and Telegram caps those at 64 bytes.
pub const MAX_NAME_BYTES: usize = 56;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub String);

/// Participant category used by the rotation: `Leads` are parents, `Follows` are children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Leads,
    Follows,
}

impl PersonRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Follows => "follows",
        }
    }
}

impl std::str::FromStr for PersonRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leads" | "parent" => Ok(Self::Leads),
            "follows" | "child" => Ok(Self::Follows),
            other => Err(format!("unsupported person role `{other}` (expected leads|follows)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub role: PersonRole,
}

impl Person {
    pub fn is_follows(&self) -> bool {
        self.role == PersonRole::Follows
    }
}

/// Looks `name` up by exact match.
pub fn find_person<'a>(people: &'a [Person], name: &str) -> Result<&'a Person, DomainError> {
    people
        .iter()
        .find(|person| person.name == name)
        .ok_or_else(|| DomainError::UnknownPerson(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{find_person, Person, PersonId, PersonRole};
    use crate::errors::DomainError;

    #[test]
    fn find_person_is_exact() {
        let people = vec![Person {
            id: PersonId("P-1".into()),
            name: "Alice".into(),
            role: PersonRole::Follows,
        }];
        assert_eq!(find_person(&people, "Alice").map(|person| &person.id.0), Ok(&"P-1".to_string()));
        assert_eq!(
            find_person(&people, "alice"),
            Err(DomainError::UnknownPerson("alice".to_string()))
        );
    }

    #[test]
    fn role_parsing_accepts_family_aliases() {
        assert_eq!("leads".parse::<PersonRole>(), Ok(PersonRole::Leads));
        assert_eq!(" Child ".parse::<PersonRole>(), Ok(PersonRole::Follows));
        assert!("uncle".parse::<PersonRole>().is_err());
    }
}
