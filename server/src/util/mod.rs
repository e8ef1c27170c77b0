/*
 * Created on Fri Jun 25 2021
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2021, The Kestrel developers
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

#[macro_export]
/// ## The action macro
///
/// A macro for adding all the _fuss_ to an action. Implementing actions should
/// be simple and should not require us to repeatedly specify the stream
/// generic and its trait bound. This macro does all of that behind the scenes
/// for you, including handling docs (if any), adding the action return type
/// and finally making your function async. It has a dedicated arm for actions
/// that consume their argument iterator mutably
macro_rules! action {
    (
        $($(#[$attr:meta])*
        fn $fname:ident($($argname:ident: $argty:ty),*)
        $block:block)*
    ) => {
            $($(#[$attr])*
            pub async fn $fname<Strm>($($argname: $argty,)*) -> $crate::actions::ActionResult<()>
            where
                Strm: $crate::dbnet::BufferedSocketStream,
                $block)*
    };
    (
        $($(#[$attr:meta])*
        fn $fname:ident($argone:ident: $argonety:ty, $argtwo:ident: $argtwoty:ty, mut $argthree:ident: $argthreety:ty)
        $block:block)*
    ) => {
            $($(#[$attr])*
            pub async fn $fname<Strm>($argone: $argonety, $argtwo: $argtwoty, mut $argthree: $argthreety) -> $crate::actions::ActionResult<()>
            where
                Strm: $crate::dbnet::BufferedSocketStream,
                $block)*
    };
}

#[macro_export]
/// Skip to the next loop iteration if the provided expression evaluates to
/// an error
macro_rules! skip_loop_err {
    ($expr:expr) => {
        match $expr {
            Ok(ret) => ret,
            Err(_) => continue,
        }
    };
}
