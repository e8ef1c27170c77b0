/*
 * Created on Mon Aug 03 2020
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2020, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The Query Engine
//!
//! The dispatcher between decoded frames and the actions. An incoming frame
//! becomes an [`ActionGroup`]; its first element names the command
//! (matched case-sensitively, clients uppercase before sending) and the
//! rest are handed to the action as an [`ActionIter`].

use crate::actions::{self, ActionError, ActionResult};
use crate::coredb::CoreDB;
use crate::dbnet::connection::Connection;
use crate::dbnet::BufferedSocketStream;
use crate::gen_match;
use libkestrel::protocol::Value;
use std::vec::IntoIter;

mod tags {
    //! This module is a collection of tags/strings used for evaluating queries
    //! and responses
    /// `GET` action tag
    pub const TAG_GET: &str = "GET";
    /// `SET` action tag
    pub const TAG_SET: &str = "SET";
    /// `DELETE` action tag
    pub const TAG_DELETE: &str = "DELETE";
    /// `FLUSH` action tag
    pub const TAG_FLUSH: &str = "FLUSH";
    /// `MGET` action tag
    pub const TAG_MGET: &str = "MGET";
    /// `MSET` action tag
    pub const TAG_MSET: &str = "MSET";
    /// `LPUSH` action tag
    pub const TAG_LPUSH: &str = "LPUSH";
    /// `RPUSH` action tag
    pub const TAG_RPUSH: &str = "RPUSH";
    /// `LPOP` action tag
    pub const TAG_LPOP: &str = "LPOP";
    /// `RPOP` action tag
    pub const TAG_RPOP: &str = "RPOP";
    /// `BLPOP` action tag
    pub const TAG_BLPOP: &str = "BLPOP";
    /// `BRPOP` action tag
    pub const TAG_BRPOP: &str = "BRPOP";
    /// `LLEN` action tag
    pub const TAG_LLEN: &str = "LLEN";
    /// `EXPIRE` action tag
    pub const TAG_EXPIRE: &str = "EXPIRE";
    /// `TTL` action tag
    pub const TAG_TTL: &str = "TTL";
    /// `PERSIST` action tag
    pub const TAG_PERSIST: &str = "PERSIST";
    /// `INFO` action tag
    pub const TAG_INFO: &str = "INFO";
}

/// # `ActionGroup`
///
/// The `ActionGroup` holds the elements of one command: the command word
/// itself followed by its arguments. It may look like:
/// ```text
/// ["GET", "x"]
/// ```
#[derive(Debug, PartialEq)]
pub struct ActionGroup(Vec<Value>);

impl ActionGroup {
    /// Build an action group from a decoded frame. A command is normally
    /// the outermost array; a bare string frame is split on whitespace
    /// instead, for hand-typed clients
    pub fn from_frame(frame: Value) -> ActionResult<Self> {
        match frame {
            Value::List(elements) => Ok(ActionGroup(elements)),
            Value::Str(line) => Ok(ActionGroup(
                line.split_whitespace().map(Value::from).collect(),
            )),
            _ => Err(ActionError::ActionError(
                "Wrong format: a request must be an array or a simple string".to_owned(),
            )),
        }
    }
    /// Returns how many arguments are there excluding the name of the action
    pub fn howmany(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
    pub fn get_first(&self) -> Option<&Value> {
        self.0.first()
    }
}

impl IntoIterator for ActionGroup {
    type Item = Value;
    type IntoIter = ActionIter;
    fn into_iter(self) -> ActionIter {
        let mut iter = self.0.into_iter();
        // skip the command word itself
        let _ = iter.next();
        ActionIter { iter }
    }
}

/// A cursor over the arguments of one [`ActionGroup`], with typed
/// extractors for the shapes the actions expect
#[derive(Debug)]
pub struct ActionIter {
    iter: IntoIter<Value>,
}

impl Iterator for ActionIter {
    type Item = Value;
    fn next(&mut self) -> Option<Value> {
        self.iter.next()
    }
}

impl ActionIter {
    /// The number of arguments left
    pub fn len(&self) -> usize {
        self.iter.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The next argument, which must be present
    pub fn next_value(&mut self) -> ActionResult<Value> {
        self.iter.next().ok_or_else(|| {
            ActionError::ActionError("Wrong format: missing argument".to_owned())
        })
    }
    /// The next argument, which must be a text key
    pub fn next_key(&mut self) -> ActionResult<String> {
        match self.iter.next() {
            Some(Value::Str(key)) => Ok(key),
            _ => Err(ActionError::ActionError(
                "Wrong format: keys must be strings".to_owned(),
            )),
        }
    }
    /// The next argument, parsed as a whole number of seconds
    pub fn next_seconds(&mut self) -> ActionResult<i64> {
        let wrongfmt =
            || ActionError::ActionError("Wrong format: expected a number of seconds".to_owned());
        match self.iter.next() {
            Some(Value::Int(seconds)) => Ok(seconds),
            Some(Value::Str(text)) => text.parse::<i64>().map_err(|_| wrongfmt()),
            _ => Err(wrongfmt()),
        }
    }
}

/// Execute a simple query
pub async fn execute_simple<Strm>(
    db: &CoreDB,
    con: &mut Connection<Strm>,
    frame: Value,
) -> ActionResult<()>
where
    Strm: BufferedSocketStream,
{
    let group = ActionGroup::from_frame(frame)?;
    let first = match group.get_first() {
        None => {
            return Err(ActionError::ActionError("Missing command".to_owned()));
        }
        Some(Value::Str(cmd)) => cmd.clone(),
        Some(_) => {
            return Err(ActionError::ActionError(
                "Wrong format: the command name must be a string".to_owned(),
            ));
        }
    };
    let act = group.into_iter();
    gen_match!(
        first,
        db,
        con,
        act,
        tags::TAG_GET => actions::get::get,
        tags::TAG_SET => actions::set::set,
        tags::TAG_DELETE => actions::del::del,
        tags::TAG_FLUSH => actions::flush::flush,
        tags::TAG_MGET => actions::mget::mget,
        tags::TAG_MSET => actions::mset::mset,
        tags::TAG_LPUSH => actions::lists::lpush,
        tags::TAG_RPUSH => actions::lists::rpush,
        tags::TAG_LPOP => actions::lists::lpop,
        tags::TAG_RPOP => actions::lists::rpop,
        tags::TAG_LLEN => actions::lists::llen,
        tags::TAG_BLPOP => actions::lists::blocking::blpop,
        tags::TAG_BRPOP => actions::lists::blocking::brpop,
        tags::TAG_EXPIRE => actions::expire::expire,
        tags::TAG_TTL => actions::expire::ttl,
        tags::TAG_PERSIST => actions::expire::persist,
        tags::TAG_INFO => actions::info::info
    );
    Ok(())
}

#[macro_export]
/// A match generator macro built specifically for the
/// `crate::queryengine::execute_simple` function
///
/// **NOTE:** This macro needs _paths_ for both sides of the $x => $y, to
/// produce something sensible
macro_rules! gen_match {
    ($pre:ident, $db:ident, $con:ident, $buf:ident, $($x:path => $y:path),*) => {
        match $pre.as_str() {
            // First repeat over all the $x => $y patterns, passing in the
            // variables and adding .await calls and adding the `?`
            $(
                $x => $y($db, $con, $buf).await?,
            )*
            // Now add the final case where no action is matched
            _ => {
                return Err($crate::actions::ActionError::ActionError(
                    format!("Unrecognized command: {}", $pre),
                ));
            },
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_group_from_array() {
        let group = ActionGroup::from_frame(Value::List(vec![
            "GET".into(),
            "x".into(),
        ]))
        .unwrap();
        assert_eq!(group.howmany(), 1);
        assert_eq!(group.get_first(), Some(&"GET".into()));
        let args: Vec<Value> = group.into_iter().collect();
        assert_eq!(args, vec!["x".into()]);
    }

    #[test]
    fn test_action_group_from_simple_string() {
        let group = ActionGroup::from_frame("SET  k0 v0".into()).unwrap();
        assert_eq!(group.get_first(), Some(&"SET".into()));
        assert_eq!(group.howmany(), 2);
    }

    #[test]
    fn test_action_group_rejects_scalars() {
        assert!(ActionGroup::from_frame(Value::Int(1)).is_err());
    }

    #[test]
    fn test_action_iter_extractors() {
        let group = ActionGroup::from_frame(Value::List(vec![
            "EXPIRE".into(),
            "k".into(),
            Value::Int(100),
        ]))
        .unwrap();
        let mut act = group.into_iter();
        assert_eq!(act.len(), 2);
        assert_eq!(act.next_key().unwrap(), "k");
        assert_eq!(act.next_seconds().unwrap(), 100);
        assert!(act.next_value().is_err());
    }

    #[test]
    fn test_action_iter_rejects_non_string_keys() {
        let group =
            ActionGroup::from_frame(Value::List(vec!["GET".into(), Value::Int(9)])).unwrap();
        let mut act = group.into_iter();
        assert!(act.next_key().is_err());
    }

    #[test]
    fn test_seconds_parse_from_text() {
        let group = ActionGroup::from_frame("EXPIRE k 42".into()).unwrap();
        let mut act = group.into_iter();
        let _ = act.next_key().unwrap();
        assert_eq!(act.next_seconds().unwrap(), 42);
    }
}
