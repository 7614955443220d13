// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module handles the transport side of a drain session: establishing
//! the connection to the broker, opening the communication channel, and the
//! two teardown operations the shutdown sequence relies on. Teardown is
//! tolerant: closing an already-closed transport is a no-op.

use crate::{config::EndpointConfig, errors::DrainError};
use lapin::{
    options::BasicCancelOptions,
    types::LongString,
    uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo},
    Channel, Connection, ConnectionProperties,
};
use tracing::{debug, error, info};

/// Connection name advertised to the broker.
const CONNECTION_NAME: &str = "amqp-drain";

/// Reply code sent with an orderly Connection.Close.
const REPLY_SUCCESS: u16 = 200;

/// Establishes a connection to the broker described by `endpoint`.
///
/// The URI is assembled as a `lapin::uri::AMQPUri` value rather than a
/// formatted string, so credentials containing reserved characters survive
/// intact, and the scheme follows the endpoint's TLS flag.
///
/// # Parameters
/// * `endpoint` - Broker host, port, vhost, TLS flag and credentials
///
/// # Returns
/// * `Result<Connection, DrainError>` - The live connection, or
///   `DrainError::Connection` on failure
pub async fn connect(endpoint: &EndpointConfig) -> Result<Connection, DrainError> {
    info!(
        host = %endpoint.host,
        port = endpoint.port,
        vhost = %endpoint.vhost,
        "connecting to broker"
    );
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(CONNECTION_NAME));

    match Connection::connect_uri(amqp_uri(endpoint), options).await {
        Ok(connection) => {
            debug!("amqp connected");
            Ok(connection)
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(DrainError::Connection)
        }
    }
}

/// Creates the session channel on an established connection.
///
/// # Returns
/// * `Result<Channel, DrainError>` - The channel, or `DrainError::Channel`
///   on failure
pub async fn open_channel(connection: &Connection) -> Result<Channel, DrainError> {
    debug!("creating amqp channel...");
    match connection.create_channel().await {
        Ok(channel) => {
            debug!("channel created");
            Ok(channel)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(DrainError::Channel)
        }
    }
}

/// Closes the connection if the transport is still up.
///
/// Closing a connection that is already gone is a no-op, so the shutdown
/// sequence can call this unconditionally.
pub async fn close_connection(connection: &Connection) -> Result<(), DrainError> {
    if !connection.status().connected() {
        debug!("connection already closed");
        return Ok(());
    }

    debug!("closing amqp connection...");
    match connection.close(REPLY_SUCCESS, "closing").await {
        Ok(()) => {
            debug!("connection closed");
            Ok(())
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to close the connection");
            Err(DrainError::CloseConnection)
        }
    }
}

/// Sends a Basic.Cancel for the registered consumer tag.
pub async fn cancel_consumer(channel: &Channel, consumer_tag: &str) -> Result<(), DrainError> {
    debug!(consumer_tag = %consumer_tag, "cancelling consumer registration");
    match channel
        .basic_cancel(consumer_tag, BasicCancelOptions { nowait: false })
        .await
    {
        Ok(()) => {
            debug!("consumer cancelled");
            Ok(())
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to cancel the consumer");
            Err(DrainError::CancelConsumer(consumer_tag.to_owned()))
        }
    }
}

fn amqp_uri(endpoint: &EndpointConfig) -> AMQPUri {
    AMQPUri {
        scheme: if endpoint.tls {
            AMQPScheme::AMQPS
        } else {
            AMQPScheme::AMQP
        },
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: endpoint.username.clone(),
                password: endpoint.password.clone(),
            },
            host: endpoint.host.clone(),
            port: endpoint.port,
        },
        vhost: endpoint.vhost.clone(),
        query: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_carries_credentials_without_string_splicing() {
        let endpoint = EndpointConfig {
            host: "broker.internal".to_owned(),
            port: 5671,
            vhost: "development".to_owned(),
            tls: true,
            username: "sensor_ro".to_owned(),
            password: "p@ss%wo:rd/".to_owned(),
        };

        let uri = amqp_uri(&endpoint);
        assert_eq!(uri.scheme, AMQPScheme::AMQPS);
        assert_eq!(uri.authority.host, "broker.internal");
        assert_eq!(uri.authority.port, 5671);
        assert_eq!(uri.authority.userinfo.password, "p@ss%wo:rd/");
        assert_eq!(uri.vhost, "development");
    }

    #[test]
    fn plain_endpoints_use_the_amqp_scheme() {
        let uri = amqp_uri(&EndpointConfig::default());
        assert_eq!(uri.scheme, AMQPScheme::AMQP);
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.vhost, "/");
    }
}
