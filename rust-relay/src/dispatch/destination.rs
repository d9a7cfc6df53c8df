//! Downstream destinations and the operator's choice of which are active.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// A named downstream automation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Make,
    Ifttt,
}

impl Destination {
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Make => "make",
            Destination::Ifttt => "ifttt",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Destination::Make => "Make.com",
            Destination::Ifttt => "IFTTT",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which destinations receive accepted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationChoice {
    Make,
    Ifttt,
    Both,
}

impl DestinationChoice {
    /// Active destinations, in send and report order.
    pub fn destinations(&self) -> &'static [Destination] {
        match self {
            DestinationChoice::Make => &[Destination::Make],
            DestinationChoice::Ifttt => &[Destination::Ifttt],
            DestinationChoice::Both => &[Destination::Make, Destination::Ifttt],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationChoice::Make => "make",
            DestinationChoice::Ifttt => "ifttt",
            DestinationChoice::Both => "both",
        }
    }
}

impl FromStr for DestinationChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "make" => Ok(DestinationChoice::Make),
            "ifttt" => Ok(DestinationChoice::Ifttt),
            "both" => Ok(DestinationChoice::Both),
            _ => Err(ConfigError::InvalidChoice(s.to_string())),
        }
    }
}

/// Configured settings for one destination, before validation.
#[derive(Debug, Clone)]
pub struct DestinationEndpoint {
    pub destination: Destination,
    pub url: Option<String>,
    /// Text the response body must contain for the send to count as delivered.
    pub expected_response: Option<String>,
}

/// A validated, active destination.
#[derive(Debug, Clone)]
pub struct DestinationTarget {
    pub destination: Destination,
    pub url: Url,
    pub expected_response: Option<String>,
}

/// Immutable set of active destinations.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    choice: DestinationChoice,
    targets: Vec<DestinationTarget>,
}

impl DestinationConfig {
    /// Validate the endpoints selected by `choice`.
    ///
    /// Endpoints for inactive destinations are ignored and may be left
    /// unconfigured.
    pub fn new(
        choice: DestinationChoice,
        endpoints: &[DestinationEndpoint],
    ) -> Result<Self, ConfigError> {
        let targets = choice
            .destinations()
            .iter()
            .map(|&destination| -> Result<DestinationTarget, ConfigError> {
                let endpoint = endpoints.iter().find(|e| e.destination == destination);

                let raw_url = endpoint
                    .and_then(|e| e.url.as_deref())
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or(ConfigError::MissingDestinationUrl { destination })?;

                let url = Url::parse(raw_url).map_err(|e| ConfigError::InvalidDestinationUrl {
                    destination,
                    reason: e.to_string(),
                })?;

                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::InvalidDestinationUrl {
                        destination,
                        reason: format!("unsupported scheme '{}'", url.scheme()),
                    });
                }

                Ok(DestinationTarget {
                    destination,
                    url,
                    expected_response: endpoint
                        .and_then(|e| e.expected_response.clone())
                        .filter(|s| !s.is_empty()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { choice, targets })
    }

    pub fn choice(&self) -> DestinationChoice {
        self.choice
    }

    pub fn targets(&self) -> &[DestinationTarget] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<DestinationEndpoint> {
        vec![
            DestinationEndpoint {
                destination: Destination::Make,
                url: Some("https://hook.eu1.make.com/abc123".into()),
                expected_response: Some("Accepted".into()),
            },
            DestinationEndpoint {
                destination: Destination::Ifttt,
                url: Some("https://maker.ifttt.com/trigger/geofence/with/key/k".into()),
                expected_response: None,
            },
        ]
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!("make".parse::<DestinationChoice>().unwrap(), DestinationChoice::Make);
        assert_eq!(" IFTTT ".parse::<DestinationChoice>().unwrap(), DestinationChoice::Ifttt);
        assert_eq!("Both".parse::<DestinationChoice>().unwrap(), DestinationChoice::Both);
        assert!(matches!(
            "zapier".parse::<DestinationChoice>(),
            Err(ConfigError::InvalidChoice(_))
        ));
    }

    #[test]
    fn test_choice_destinations_are_unique_and_ordered() {
        assert_eq!(DestinationChoice::Make.destinations(), &[Destination::Make]);
        assert_eq!(DestinationChoice::Ifttt.destinations(), &[Destination::Ifttt]);
        assert_eq!(
            DestinationChoice::Both.destinations(),
            &[Destination::Make, Destination::Ifttt]
        );
    }

    #[test]
    fn test_config_both() {
        let config = DestinationConfig::new(DestinationChoice::Both, &endpoints()).unwrap();
        let targets = config.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].destination, Destination::Make);
        assert_eq!(targets[0].expected_response.as_deref(), Some("Accepted"));
        assert_eq!(targets[1].destination, Destination::Ifttt);
        assert_eq!(targets[1].url.host_str(), Some("maker.ifttt.com"));
    }

    #[test]
    fn test_inactive_destination_may_be_unconfigured() {
        let endpoints = vec![DestinationEndpoint {
            destination: Destination::Ifttt,
            url: Some("https://maker.ifttt.com/trigger/x".into()),
            expected_response: None,
        }];
        let config = DestinationConfig::new(DestinationChoice::Ifttt, &endpoints).unwrap();
        assert_eq!(config.targets().len(), 1);
        assert_eq!(config.choice(), DestinationChoice::Ifttt);
    }

    #[test]
    fn test_missing_url_for_active_destination() {
        let mut endpoints = endpoints();
        endpoints[1].url = Some("  ".into());

        let err = DestinationConfig::new(DestinationChoice::Both, &endpoints).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingDestinationUrl { destination: Destination::Ifttt }
        ));
    }

    #[test]
    fn test_invalid_url() {
        let mut endpoints = endpoints();
        endpoints[0].url = Some("not a url".into());
        assert!(matches!(
            DestinationConfig::new(DestinationChoice::Make, &endpoints),
            Err(ConfigError::InvalidDestinationUrl { .. })
        ));

        endpoints[0].url = Some("ftp://hook.make.com/x".into());
        assert!(matches!(
            DestinationConfig::new(DestinationChoice::Make, &endpoints),
            Err(ConfigError::InvalidDestinationUrl { .. })
        ));
    }

    #[test]
    fn test_destination_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Destination::Ifttt).unwrap(), "\"ifttt\"");
        assert_eq!(Destination::Make.to_string(), "Make.com");
    }
}
